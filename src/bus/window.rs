//! Rolling performance window over realized outcomes.

use std::collections::VecDeque;

/// One realized outcome and the confidence the engine had at decision time.
#[derive(Debug, Clone, Copy)]
pub struct Outcome {
    pub win: bool,
    pub confidence: f64,
}

/// Fixed-capacity ring of the most recent outcomes; oldest evicted first.
pub struct PerformanceWindow {
    capacity: usize,
    outcomes: VecDeque<Outcome>,
}

impl PerformanceWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            outcomes: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, win: bool, confidence: f64) {
        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(Outcome { win, confidence });
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Fraction of wins, or `None` while empty.
    pub fn win_rate(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            return None;
        }
        let wins = self.outcomes.iter().filter(|o| o.win).count();
        Some(wins as f64 / self.outcomes.len() as f64)
    }

    /// Mean decision-time confidence, or `None` while empty.
    pub fn avg_confidence(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            return None;
        }
        let sum: f64 = self.outcomes.iter().map(|o| o.confidence).sum();
        Some(sum / self.outcomes.len() as f64)
    }

    /// Length of the current losing streak, counted from the newest outcome.
    pub fn consecutive_losses(&self) -> u32 {
        self.outcomes.iter().rev().take_while(|o| !o.win).count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_has_no_rates() {
        let window = PerformanceWindow::new(10);
        assert!(window.is_empty());
        assert_eq!(window.win_rate(), None);
        assert_eq!(window.avg_confidence(), None);
        assert_eq!(window.consecutive_losses(), 0);
    }

    #[test]
    fn test_rates() {
        let mut window = PerformanceWindow::new(10);
        window.push(true, 0.8);
        window.push(false, 0.6);
        window.push(true, 0.7);
        window.push(false, 0.9);
        assert_eq!(window.win_rate(), Some(0.5));
        let avg = window.avg_confidence().unwrap();
        assert!((avg - 0.75).abs() < 1e-9);
        assert_eq!(window.consecutive_losses(), 1);
    }

    #[test]
    fn test_eviction_at_capacity() {
        let mut window = PerformanceWindow::new(3);
        window.push(false, 0.5);
        window.push(true, 0.5);
        window.push(true, 0.5);
        window.push(true, 0.5);
        assert_eq!(window.len(), 3);
        // The oldest outcome (the loss) was evicted
        assert_eq!(window.win_rate(), Some(1.0));
    }

    #[test]
    fn test_consecutive_losses_reset_by_win() {
        let mut window = PerformanceWindow::new(10);
        window.push(false, 0.5);
        window.push(false, 0.5);
        window.push(true, 0.5);
        assert_eq!(window.consecutive_losses(), 0);
        window.push(false, 0.5);
        window.push(false, 0.5);
        assert_eq!(window.consecutive_losses(), 2);
    }
}
