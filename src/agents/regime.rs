//! Regime agent — structural and correlation analysis.
//!
//! Classifies the volatility/trend/liquidity regime and cross-instrument
//! correlation shifts into a base prediction with fixed weights: 50% regime
//! score, 50% correlation score.

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{clamp01, refine, Agent, FeatureProbe};
use crate::config::SimulatorConfig;
use crate::simulator::ScenarioSimulator;
use crate::types::{feature, AgentPrediction, MarketSnapshot, PieError};

const DEFAULT_VOLATILITY: f64 = 0.025;

pub struct RegimeAgent {
    simulator: ScenarioSimulator,
    seed: Option<u64>,
}

impl RegimeAgent {
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

    /// Volatility, trend, and liquidity regime classification.
    fn regime_score(probe: &mut FeatureProbe<'_>) -> f64 {
        let mut score = 0.5;

        // Elevated volatility vs history warrants caution; a calm regime
        // supports conviction.
        if let (Some(current), Some(historical)) = (
            probe.num(feature::VOLATILITY),
            probe.num(feature::HISTORICAL_VOLATILITY),
        ) {
            let ratio = if historical > 0.0 {
                current / historical
            } else {
                1.0
            };
            if ratio > 1.5 {
                score -= 0.10;
            } else if ratio < 0.7 {
                score += 0.10;
            }
        }

        // Only strong trends count as a regime signal
        if let Some(trend) = probe.num(feature::TREND_STRENGTH) {
            if trend.abs() > 0.7 {
                score += trend * 0.15;
            }
        }

        // Widening spreads signal a deteriorating liquidity regime
        if let (Some(spread), Some(avg)) =
            (probe.num(feature::SPREAD), probe.num(feature::AVG_SPREAD))
        {
            if avg > 0.0 && spread / avg > 1.5 {
                score -= 0.10;
            }
        }

        clamp01(score)
    }

    /// Cross-instrument correlation structure. Stronger coupling to the
    /// broad index makes the instrument more predictable.
    fn correlation_score(probe: &mut FeatureProbe<'_>) -> f64 {
        let mut score = 0.5;

        if let Some(corr) = probe.num(feature::CORRELATION_INDEX) {
            score += corr.abs() * 0.15;
        }

        if let Some(corr) = probe.num(feature::CORRELATION_SECTOR) {
            score += corr * 0.10;
        }

        clamp01(score)
    }
}

#[async_trait]
impl Agent for RegimeAgent {
    fn name(&self) -> &'static str {
        "regime"
    }

    async fn predict(&self, snapshot: &MarketSnapshot) -> Result<AgentPrediction, PieError> {
        snapshot.validate()?;

        let mut probe = FeatureProbe::new(snapshot);
        let regime = Self::regime_score(&mut probe);
        let correlation = Self::correlation_score(&mut probe);

        let base_value = clamp01(regime * 0.5 + correlation * 0.5);
        let base_confidence = 0.5 + 0.4 * (1.0 - 0.5 * (regime - correlation).abs());

        let volatility = probe.num(feature::VOLATILITY).unwrap_or(DEFAULT_VOLATILITY);

        let mut sub_scores = BTreeMap::new();
        sub_scores.insert("regime".to_string(), regime);
        sub_scores.insert("correlation".to_string(), correlation);

        refine(
            self.name(),
            base_value,
            base_confidence,
            volatility,
            &self.simulator,
            self.seed,
            sub_scores,
            probe.into_missing(),
            format!("regime={regime:.2}, correlation={correlation:.2}"),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
