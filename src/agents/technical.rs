//! Technical agent — deterministic indicator analysis.
//!
//! Scores oscillator extremes, trend-following crossovers, and volume
//! confirmation into a base prediction with fixed weights: 60% indicator
//! score, 40% order-flow score.

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{clamp01, refine, Agent, FeatureProbe};
use crate::config::SimulatorConfig;
use crate::simulator::ScenarioSimulator;
use crate::types::{feature, AgentPrediction, MarketSnapshot, PieError};

/// Volatility assumed when the snapshot carries no estimate.
const DEFAULT_VOLATILITY: f64 = 0.02;

pub struct TechnicalAgent {
    simulator: ScenarioSimulator,
    seed: Option<u64>,
}

impl TechnicalAgent {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            simulator: ScenarioSimulator::new(config),
            seed: None,
        }
    }

    /// Pin the scenario seed (reproducible predictions, used by tests and
    /// replay harnesses).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Oscillator and crossover score. Starts neutral; each present
    /// indicator shifts it by its documented weight.
    fn indicator_score(probe: &mut FeatureProbe<'_>) -> f64 {
        let mut score = 0.5;

        // RSI extremes: oversold is a buy signal, overbought a sell signal
        if let Some(rsi) = probe.num(feature::RSI) {
            if rsi < 30.0 {
                score += 0.15;
            } else if rsi > 70.0 {
                score -= 0.15;
            }
        }

        // MACD vs signal line crossover
        if let (Some(macd), Some(signal)) =
            (probe.num(feature::MACD), probe.num(feature::MACD_SIGNAL))
        {
            score += if macd > signal { 0.10 } else { -0.10 };
        }

        // Position within the Bollinger bands
        if let (Some(price), Some(upper), Some(lower)) = (
            probe.num(feature::PRICE),
            probe.num(feature::BOLLINGER_UPPER),
            probe.num(feature::BOLLINGER_LOWER),
        ) {
            let band_position = if upper > lower {
                (price - lower) / (upper - lower)
            } else {
                0.5
            };
            score += (band_position - 0.5) * 0.2;
        }

        // Moving average crossover
        if let (Some(short), Some(long)) =
            (probe.num(feature::MA_SHORT), probe.num(feature::MA_LONG))
        {
            score += if short > long { 0.10 } else { -0.10 };
        }

        clamp01(score)
    }

    /// Volume confirmation, trend strength, and sentiment.
    fn flow_score(probe: &mut FeatureProbe<'_>) -> f64 {
        let mut score = 0.5;

        if let (Some(volume), Some(avg)) =
            (probe.num(feature::VOLUME), probe.num(feature::AVG_VOLUME))
        {
            if avg > 0.0 {
                let ratio = volume / avg;
                if ratio > 1.5 {
                    score += 0.10;
                } else if ratio < 0.5 {
                    score -= 0.05;
                }
            }
        }

        if let Some(trend) = probe.num(feature::TREND_STRENGTH) {
            score += trend * 0.15;
        }

        if let Some(sentiment) = probe.num(feature::SENTIMENT) {
            score += sentiment * 0.10;
        }

        clamp01(score)
    }
}

#[async_trait]
impl Agent for TechnicalAgent {
    fn name(&self) -> &'static str {
        "technical"
    }

    async fn predict(&self, snapshot: &MarketSnapshot) -> Result<AgentPrediction, PieError> {
        snapshot.validate()?;

        let mut probe = FeatureProbe::new(snapshot);
        let indicators = Self::indicator_score(&mut probe);
        let flow = Self::flow_score(&mut probe);

        let base_value = clamp01(indicators * 0.6 + flow * 0.4);
        // Agreement between the two score families drives base confidence.
        let base_confidence = 0.5 + 0.4 * (1.0 - (indicators - flow).abs());

        let volatility = probe.num(feature::VOLATILITY).unwrap_or(DEFAULT_VOLATILITY);

        let mut sub_scores = BTreeMap::new();
        sub_scores.insert("indicators".to_string(), indicators);
        sub_scores.insert("flow".to_string(), flow);

        refine(
            self.name(),
            base_value,
            base_confidence,
            volatility,
            &self.simulator,
            self.seed,
            sub_scores,
            probe.into_missing(),
            format!("indicators={indicators:.2}, flow={flow:.2}"),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
