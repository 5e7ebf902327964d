//! Confidence scorer — fuses ensemble output into one tradeable number.
//!
//! Four components, fixed weights from config: cross-agent consensus,
//! simulated probability of profit, historical win rate, and data quality
//! (penalized per distinct missing feature). The fused score gates the
//! trade/skip verdict and sizes the position linearly above the threshold.

use tracing::debug;

use crate::config::ScorerConfig;
use crate::types::{
    ConfidenceBreakdown, ConfidenceLevel, ConfidenceScore, EnsemblePrediction, TradeAction,
};

pub struct ConfidenceScorer {
    config: ScorerConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// Fuses the ensemble into a confidence score.
    ///
    /// `historical_accuracy` is the recent win rate, or `None` before any
    /// outcome has been recorded; the neutral prior 0.5 fills in until then.
    /// `missing_features` is the count of distinct feature names the agents
    /// consulted but did not find.
    pub fn score(
        &self,
        ensemble: &EnsemblePrediction,
        historical_accuracy: Option<f64>,
        missing_features: usize,
    ) -> ConfidenceScore {
        let c = &self.config;

        let breakdown = ConfidenceBreakdown {
            consensus: ensemble.consensus_strength,
            probability_of_profit: ensemble.risk.probability_of_profit,
            historical_accuracy: historical_accuracy.unwrap_or(0.5),
            data_quality: (1.0 - c.missing_feature_penalty * missing_features as f64)
                .clamp(0.0, 1.0),
        };

        let value = (c.consensus_weight * breakdown.consensus
            + c.profit_weight * breakdown.probability_of_profit
            + c.accuracy_weight * breakdown.historical_accuracy
            + c.quality_weight * breakdown.data_quality)
            .clamp(0.0, 1.0);

        let score = ConfidenceScore {
            value,
            level: ConfidenceLevel::from_score(value),
            breakdown,
        };
        debug!(%score, "Confidence fused");
        score
    }

    /// Trade/skip verdict with a position multiplier.
    ///
    /// Below the threshold this is a Skip with multiplier 0. At the
    /// threshold the multiplier starts at the configured minimum and rises
    /// linearly, reaching the maximum at `full_confidence`.
    pub fn decide(&self, score: &ConfidenceScore) -> (TradeAction, f64) {
        let c = &self.config;
        if score.value < c.confidence_threshold {
            return (TradeAction::Skip, 0.0);
        }

        let span = c.full_confidence - c.confidence_threshold;
        let progress = if span > 0.0 {
            ((score.value - c.confidence_threshold) / span).min(1.0)
        } else {
            1.0
        };
        let multiplier = c.min_position_multiplier
            + progress * (c.max_position_multiplier - c.min_position_multiplier);
        (TradeAction::Trade, multiplier)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
