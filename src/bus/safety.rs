//! Safety state machine over the performance window.
//!
//! ACTIVE → ALERT on degraded win rate or low decision clarity; any state
//! → HALTED on a breached hard limit (loss streak, win-rate floor,
//! drawdown). HALTED never self-resumes: only `reset()` leaves it.

use tracing::{info, warn};

use super::window::PerformanceWindow;
use crate::config::SafetyConfig;
use crate::types::EngineState;

pub struct SafetyMonitor {
    config: SafetyConfig,
    state: EngineState,
    /// Losses in a row since the last win or reset. Tracked here rather than
    /// derived from the window: `reset()` must clear the streak while the
    /// window (and its own `consecutive_losses()` view) survives.
    loss_streak: u32,
    /// Healthy outcomes in a row while in ALERT.
    recovery_count: u32,
}

impl SafetyMonitor {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            state: EngineState::Active,
            loss_streak: 0,
            recovery_count: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Re-evaluates the state after one recorded outcome. `drawdown` is the
    /// current fractional decline from peak equity.
    pub fn observe(&mut self, win: bool, window: &PerformanceWindow, drawdown: f64) -> EngineState {
        if win {
            self.loss_streak = 0;
        } else {
            self.loss_streak += 1;
        }

        if self.state == EngineState::Halted {
            return self.state;
        }

        let enough_samples = window.len() >= self.config.min_samples;
        let win_rate = window.win_rate().unwrap_or(1.0);
        let avg_confidence = window.avg_confidence().unwrap_or(1.0);

        if let Some(reason) = self.halt_reason(enough_samples, win_rate, drawdown) {
            warn!(from = %self.state, %reason, "Engine HALTED");
            self.state = EngineState::Halted;
            return self.state;
        }

        let degraded = enough_samples
            && (win_rate < self.config.alert_win_rate
                || avg_confidence < self.config.clarity_threshold);

        match self.state {
            EngineState::Active if degraded => {
                warn!(
                    win_rate,
                    avg_confidence,
                    "Engine entering ALERT"
                );
                self.state = EngineState::Alert;
                self.recovery_count = 0;
            }
            EngineState::Alert => {
                if degraded {
                    self.recovery_count = 0;
                } else {
                    self.recovery_count += 1;
                    if self.recovery_count >= self.config.recovery_streak {
                        info!(win_rate, "Engine recovered to ACTIVE");
                        self.state = EngineState::Active;
                        self.recovery_count = 0;
                    }
                }
            }
            _ => {}
        }
        self.state
    }

    fn halt_reason(&self, enough_samples: bool, win_rate: f64, drawdown: f64) -> Option<&str> {
        if self.loss_streak >= self.config.max_consecutive_losses {
            Some("consecutive loss limit")
        } else if drawdown > self.config.max_drawdown {
            Some("max drawdown breached")
        } else if enough_samples && win_rate < self.config.halt_win_rate {
            Some("win rate below halt floor")
        } else {
            None
        }
    }

    /// Manual recovery. Clears the streak counters and returns to ACTIVE.
    pub fn reset(&mut self) {
        info!(from = %self.state, "Engine manually reset to ACTIVE");
        self.state = EngineState::Active;
        self.loss_streak = 0;
        self.recovery_count = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
