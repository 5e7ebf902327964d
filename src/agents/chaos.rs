//! Chaos agent — entropy and pattern analysis.
//!
//! Measures the disorder of recent price action (return entropy, volatility
//! clustering) and recognized chart patterns into a base prediction with
//! fixed weights: 40% entropy score, 60% pattern score. As the volatility
//! lens of the ensemble it simulates with a 1.2× volatility scale.

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{clamp01, refine, Agent, FeatureProbe};
use crate::config::SimulatorConfig;
use crate::simulator::ScenarioSimulator;
use crate::types::{feature, AgentPrediction, MarketSnapshot, PieError};

const DEFAULT_VOLATILITY: f64 = 0.03;
const VOLATILITY_SCALE: f64 = 1.2;

/// Directional prior per recognized chart pattern.
fn pattern_prior(pattern: &str) -> f64 {
    match pattern {
        "head_and_shoulders" => 0.3,
        "double_bottom" => 0.7,
        "ascending_triangle" => 0.7,
        "descending_triangle" => 0.3,
        "bull_flag" => 0.75,
        "bear_flag" => 0.25,
        _ => 0.5,
    }
}

pub struct ChaosAgent {
    simulator: ScenarioSimulator,
    seed: Option<u64>,
}

impl ChaosAgent {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            simulator: ScenarioSimulator::new(config),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Disorder of recent price action. More entropy means more chaos and a
    /// wider plausible outcome range.
    fn entropy_score(probe: &mut FeatureProbe<'_>) -> f64 {
        let mut score = 0.5;

        if let Some(prices) = probe.series(feature::PRICE_HISTORY) {
            if prices.len() > 10 {
                let returns: Vec<f64> = prices
                    .windows(2)
                    .filter(|w| w[0] != 0.0)
                    .map(|w| (w[1] - w[0]) / w[0])
                    .collect();
                let entropy = shannon_entropy(&returns, 10);
                // ln(10) ≈ 2.3 is the max for 10 bins; /3 keeps headroom
                let normalized = (entropy / 3.0).min(1.0);
                score = 0.5 + (normalized - 0.5) * 0.3;
            }
        }

        if let Some(vols) = probe.series(feature::VOLATILITY_HISTORY) {
            if vols.len() > 5 {
                // Volatility clustering: autocorrelation of successive vols
                score += autocorrelation(vols) * 0.10;
            }
        }

        clamp01(score)
    }

    /// Recognized chart pattern plus fractal trending behavior.
    fn pattern_score(probe: &mut FeatureProbe<'_>) -> f64 {
        let mut score = match probe.tag(feature::CHART_PATTERN) {
            Some(pattern) => pattern_prior(pattern),
            None => 0.5,
        };

        if let Some(fractal) = probe.num(feature::FRACTAL_DIMENSION) {
            // 1.5–2.0 indicates trending rather than mean-reverting behavior
            if (1.5..=2.0).contains(&fractal) {
                score += 0.10;
            }
        }

        clamp01(score)
    }
}

#[async_trait]
impl Agent for ChaosAgent {
    fn name(&self) -> &'static str {
        "chaos"
    }

    async fn predict(&self, snapshot: &MarketSnapshot) -> Result<AgentPrediction, PieError> {
        snapshot.validate()?;

        let mut probe = FeatureProbe::new(snapshot);
        let entropy = Self::entropy_score(&mut probe);
        let pattern = Self::pattern_score(&mut probe);

        let base_value = clamp01(entropy * 0.4 + pattern * 0.6);

        // Low disorder and decisive patterns both raise conviction.
        let entropy_factor = 1.0 - (entropy - 0.5).abs() * 0.5;
        let pattern_factor = (pattern - 0.5).abs() * 2.0;
        let base_confidence = (0.5 + entropy_factor * 0.2 + pattern_factor * 0.3).min(0.95);

        let volatility = probe
            .num(feature::VOLATILITY)
            .map(|v| v * VOLATILITY_SCALE)
            .unwrap_or(DEFAULT_VOLATILITY);

        let mut sub_scores = BTreeMap::new();
        sub_scores.insert("entropy".to_string(), entropy);
        sub_scores.insert("pattern".to_string(), pattern);

        refine(
            self.name(),
            base_value,
            base_confidence,
            volatility,
            &self.simulator,
            self.seed,
            sub_scores,
            probe.into_missing(),
            format!("entropy={entropy:.2}, pattern={pattern:.2}"),
        )
    }
}

/// Shannon entropy of a binned empirical distribution (natural log).
fn shannon_entropy(values: &[f64], bins: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() || max <= min {
        return 0.0;
    }

    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = (((v - min) / (max - min)) * bins as f64) as usize;
        counts[idx.min(bins - 1)] += 1;
    }

    let total = values.len() as f64;
    -counts
        .iter()
        .filter(|c| **c > 0)
        .map(|c| {
            let p = *c as f64 / total;
            p * p.ln()
        })
        .sum::<f64>()
}

/// Lag-1 Pearson autocorrelation; 0 for degenerate series.
fn autocorrelation(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 3 {
        return 0.0;
    }
    let a = &series[..n - 1];
    let b = &series[1..];
    let mean_a = a.iter().sum::<f64>() / a.len() as f64;
    let mean_b = b.iter().sum::<f64>() / b.len() as f64;

    let cov: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum();
    let var_a: f64 = a.iter().map(|x| (x - mean_a).powi(2)).sum();
    let var_b: f64 = b.iter().map(|y| (y - mean_b).powi(2)).sum();

    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        0.0
    } else {
        cov / denom
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_agent() -> ChaosAgent {
        ChaosAgent::new(SimulatorConfig {
            n_scenarios: 1000,
            ..Default::default()
        })
        .with_seed(13)
    }

    #[tokio::test]
    async fn test_bullish_pattern_raises_value() {
        let agent = make_agent();
        let bull = MarketSnapshot::new("X")
            .with_num(feature::VOLATILITY, 0.0)
            .with_tag(feature::CHART_PATTERN, "bull_flag");
        let bear = MarketSnapshot::new("X")
            .with_num(feature::VOLATILITY, 0.0)
            .with_tag(feature::CHART_PATTERN, "bear_flag");

        let up = agent.predict(&bull).await.unwrap();
        let down = agent.predict(&bear).await.unwrap();
        assert!(up.base_value > 0.5);
        assert!(down.base_value < 0.5);
        assert_eq!(up.sub_scores["pattern"], 0.75);
    }

    #[tokio::test]
    async fn test_unknown_pattern_is_neutral() {
        let agent = make_agent();
        let snap = MarketSnapshot::new("X")
            .with_num(feature::VOLATILITY, 0.0)
            .with_tag(feature::CHART_PATTERN, "cup_and_handle");
        let pred = agent.predict(&snap).await.unwrap();
        assert_eq!(pred.sub_scores["pattern"], 0.5);
    }

    #[tokio::test]
    async fn test_fractal_trending_bonus() {
        let agent = make_agent();
        let snap = MarketSnapshot::new("X")
            .with_num(feature::VOLATILITY, 0.0)
            .with_num(feature::FRACTAL_DIMENSION, 1.7);
        let pred = agent.predict(&snap).await.unwrap();
        assert!((pred.sub_scores["pattern"] - 0.6).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_short_history_ignored() {
        let agent = make_agent();
        let snap = MarketSnapshot::new("X")
            .with_num(feature::VOLATILITY, 0.0)
            .with_series(feature::PRICE_HISTORY, vec![100.0, 101.0, 102.0]);
        let pred = agent.predict(&snap).await.unwrap();
        assert!((pred.sub_scores["entropy"] - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_decisive_pattern_raises_confidence() {
        let agent = make_agent();
        let decisive = MarketSnapshot::new("X")
            .with_num(feature::VOLATILITY, 0.0)
            .with_tag(feature::CHART_PATTERN, "bull_flag");
        let vague = MarketSnapshot::new("X").with_num(feature::VOLATILITY, 0.0);
        let a = agent.predict(&decisive).await.unwrap();
        let b = agent.predict(&vague).await.unwrap();
        assert!(a.base_confidence > b.base_confidence);
    }

    #[test]
    fn test_shannon_entropy_uniform_exceeds_constant() {
        let spread: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let tight = vec![1.0; 100];
        assert!(shannon_entropy(&spread, 10) > 2.0);
        assert_eq!(shannon_entropy(&tight, 10), 0.0);
    }

    #[test]
    fn test_autocorrelation_extremes() {
        let trending: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert!(autocorrelation(&trending) > 0.9);
        let flat = vec![2.0; 20];
        assert_eq!(autocorrelation(&flat), 0.0);
    }

    #[tokio::test]
    async fn test_volatility_scaled() {
        // With vol = 0 in the snapshot, scaling keeps it 0 → deterministic
        let agent = make_agent();
        let snap = MarketSnapshot::new("X").with_num(feature::VOLATILITY, 0.0);
        let pred = agent.predict(&snap).await.unwrap();
        assert_eq!(pred.risk.std, 0.0);
    }
}
