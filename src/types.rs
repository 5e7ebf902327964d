//! Shared types for the PIE engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that simulator, agent, calibrator,
//! and bus modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

/// Snapshot schema version this engine understands. Snapshots carrying any
/// other version are rejected before prediction starts.
pub const SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Feature-name contract
// ---------------------------------------------------------------------------

/// Documented feature names the agents consume. The ingestion collaborator
/// populates whichever subset it has; missing names degrade to neutral
/// sub-scores rather than failing the request.
pub mod feature {
    pub const RSI: &str = "rsi";
    pub const MACD: &str = "macd";
    pub const MACD_SIGNAL: &str = "macd_signal";
    pub const PRICE: &str = "price";
    pub const BOLLINGER_UPPER: &str = "bollinger_upper";
    pub const BOLLINGER_LOWER: &str = "bollinger_lower";
    pub const MA_SHORT: &str = "ma_short";
    pub const MA_LONG: &str = "ma_long";
    pub const VOLUME: &str = "volume";
    pub const AVG_VOLUME: &str = "avg_volume";
    pub const TREND_STRENGTH: &str = "trend_strength";
    pub const SENTIMENT: &str = "sentiment";
    pub const VOLATILITY: &str = "volatility";
    pub const HISTORICAL_VOLATILITY: &str = "historical_volatility";
    pub const SPREAD: &str = "spread";
    pub const AVG_SPREAD: &str = "avg_spread";
    pub const CORRELATION_INDEX: &str = "correlation_index";
    pub const CORRELATION_SECTOR: &str = "correlation_sector";
    pub const PRICE_HISTORY: &str = "price_history";
    pub const VOLATILITY_HISTORY: &str = "volatility_history";
    pub const CHART_PATTERN: &str = "chart_pattern";
    pub const FRACTAL_DIMENSION: &str = "fractal_dimension";
}

// ---------------------------------------------------------------------------
// Market snapshot
// ---------------------------------------------------------------------------

/// A single named feature value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Num(f64),
    Series(Vec<f64>),
    Tag(String),
}

/// Immutable market snapshot consumed read-only by the agents.
///
/// Produced by the (external) data pipeline; the engine never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub schema_version: u32,
    pub features: HashMap<String, FeatureValue>,
}

impl fmt::Display for MarketSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] v{} {} features @ {}",
            self.instrument,
            self.schema_version,
            self.features.len(),
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

impl MarketSnapshot {
    /// New empty snapshot for the given instrument, stamped now.
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            timestamp: Utc::now(),
            schema_version: SCHEMA_VERSION,
            features: HashMap::new(),
        }
    }

    /// Builder-style numeric feature insertion.
    pub fn with_num(mut self, name: &str, value: f64) -> Self {
        self.features.insert(name.to_string(), FeatureValue::Num(value));
        self
    }

    /// Builder-style series feature insertion (price/volatility history).
    pub fn with_series(mut self, name: &str, values: Vec<f64>) -> Self {
        self.features.insert(name.to_string(), FeatureValue::Series(values));
        self
    }

    /// Builder-style categorical feature insertion.
    pub fn with_tag(mut self, name: &str, value: &str) -> Self {
        self.features
            .insert(name.to_string(), FeatureValue::Tag(value.to_string()));
        self
    }

    /// Numeric feature lookup. `None` for absent names or non-numeric values.
    pub fn num(&self, name: &str) -> Option<f64> {
        match self.features.get(name) {
            Some(FeatureValue::Num(v)) => Some(*v),
            _ => None,
        }
    }

    /// Series feature lookup.
    pub fn series(&self, name: &str) -> Option<&[f64]> {
        match self.features.get(name) {
            Some(FeatureValue::Series(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Categorical feature lookup.
    pub fn tag(&self, name: &str) -> Option<&str> {
        match self.features.get(name) {
            Some(FeatureValue::Tag(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Structural validation: mandatory identifying fields and schema version.
    /// Feature-level gaps are not errors; they surface as quality penalties.
    pub fn validate(&self) -> Result<(), PieError> {
        if self.instrument.trim().is_empty() {
            return Err(PieError::MalformedSnapshot(
                "snapshot is missing an instrument identifier".to_string(),
            ));
        }
        if self.schema_version != SCHEMA_VERSION {
            return Err(PieError::UnsupportedSchema {
                found: self.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    /// Helper to build a well-populated test snapshot.
    #[cfg(test)]
    pub fn sample() -> Self {
        MarketSnapshot::new("BTC-USD")
            .with_num(feature::RSI, 28.0)
            .with_num(feature::MACD, 0.8)
            .with_num(feature::MACD_SIGNAL, 0.5)
            .with_num(feature::PRICE, 104.0)
            .with_num(feature::BOLLINGER_UPPER, 110.0)
            .with_num(feature::BOLLINGER_LOWER, 98.0)
            .with_num(feature::MA_SHORT, 103.0)
            .with_num(feature::MA_LONG, 100.0)
            .with_num(feature::VOLUME, 1800.0)
            .with_num(feature::AVG_VOLUME, 1000.0)
            .with_num(feature::TREND_STRENGTH, 0.6)
            .with_num(feature::SENTIMENT, 0.4)
            .with_num(feature::VOLATILITY, 0.02)
            .with_num(feature::HISTORICAL_VOLATILITY, 0.025)
            .with_num(feature::SPREAD, 0.8)
            .with_num(feature::AVG_SPREAD, 1.0)
            .with_num(feature::CORRELATION_INDEX, 0.7)
            .with_num(feature::CORRELATION_SECTOR, 0.5)
            .with_num(feature::FRACTAL_DIMENSION, 1.6)
            .with_tag(feature::CHART_PATTERN, "bull_flag")
            .with_series(
                feature::PRICE_HISTORY,
                (0..24).map(|i| 100.0 + (i as f64) * 0.2).collect(),
            )
            .with_series(
                feature::VOLATILITY_HISTORY,
                vec![0.018, 0.020, 0.019, 0.022, 0.021, 0.020],
            )
    }
}

// ---------------------------------------------------------------------------
// Risk metrics
// ---------------------------------------------------------------------------

/// Statistics reduced from one scenario batch. The batch itself is discarded
/// after this reduction; only the metrics travel downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub mean: f64,
    pub std: f64,
    /// 5th percentile of simulated outcomes (95% Value-at-Risk level).
    pub var_95: f64,
    /// 1st percentile of simulated outcomes (99% Value-at-Risk level).
    pub var_99: f64,
    pub probability_of_loss: f64,
    pub probability_of_profit: f64,
    pub n_scenarios: usize,
}

impl fmt::Display for RiskMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mean={:.4} std={:.4} VaR95={:.4} VaR99={:.4} P(loss)={:.1}% (n={})",
            self.mean,
            self.std,
            self.var_95,
            self.var_99,
            self.probability_of_loss * 100.0,
            self.n_scenarios,
        )
    }
}

// ---------------------------------------------------------------------------
// Agent prediction
// ---------------------------------------------------------------------------

/// Prediction from a single agent, already refined by scenario simulation.
///
/// `base_*` fields preserve the pre-simulation values for auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPrediction {
    pub agent: String,
    /// Probability the instrument moves favorably, in [0,1].
    pub value: f64,
    pub confidence: f64,
    pub base_value: f64,
    pub base_confidence: f64,
    /// Named diagnostic sub-scores for explainability.
    pub sub_scores: BTreeMap<String, f64>,
    /// Feature names that were absent and substituted with neutral scores.
    pub missing_features: Vec<String>,
    pub risk: RiskMetrics,
    pub reasoning: String,
}

impl fmt::Display for AgentPrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: value={:.3} conf={:.2} (base {:.3}/{:.2}, missing={})",
            self.agent,
            self.value,
            self.confidence,
            self.base_value,
            self.base_confidence,
            self.missing_features.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// Ensemble prediction
// ---------------------------------------------------------------------------

/// Weighted aggregate of the agent predictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsemblePrediction {
    pub value: f64,
    pub confidence: f64,
    /// 1 / (1 + variance of agent values), bounded to [0,1].
    /// High cross-agent variance pushes this down.
    pub consensus_strength: f64,
    /// Weights in effect when the ensemble was formed.
    pub weights: HashMap<String, f64>,
    /// Weight-averaged risk metrics across the agents.
    pub risk: RiskMetrics,
    pub agent_predictions: Vec<AgentPrediction>,
}

impl fmt::Display for EnsemblePrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ensemble value={:.3} conf={:.2} consensus={:.2} P(loss)={:.1}%",
            self.value,
            self.confidence,
            self.consensus_strength,
            self.risk.probability_of_loss * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Confidence score
// ---------------------------------------------------------------------------

/// Raw component values fused by the scorer, kept for auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub consensus: f64,
    pub probability_of_profit: f64,
    pub historical_accuracy: f64,
    pub data_quality: f64,
}

/// Human-readable confidence banding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    VeryHigh,
    High,
    Moderate,
    Low,
    VeryLow,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.90 {
            ConfidenceLevel::VeryHigh
        } else if score >= 0.80 {
            ConfidenceLevel::High
        } else if score >= 0.70 {
            ConfidenceLevel::Moderate
        } else if score >= 0.60 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceLevel::VeryHigh => write!(f, "VERY HIGH"),
            ConfidenceLevel::High => write!(f, "HIGH"),
            ConfidenceLevel::Moderate => write!(f, "MODERATE"),
            ConfidenceLevel::Low => write!(f, "LOW"),
            ConfidenceLevel::VeryLow => write!(f, "VERY LOW"),
        }
    }
}

/// Final fused confidence for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub value: f64,
    pub breakdown: ConfidenceBreakdown,
    pub level: ConfidenceLevel,
}

impl fmt::Display for ConfidenceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} ({}) [consensus={:.2} profit={:.2} accuracy={:.2} quality={:.2}]",
            self.value,
            self.level,
            self.breakdown.consensus,
            self.breakdown.probability_of_profit,
            self.breakdown.historical_accuracy,
            self.breakdown.data_quality,
        )
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Trade/no-trade verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Trade,
    Skip,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Trade => write!(f, "TRADE"),
            TradeAction::Skip => write!(f, "SKIP"),
        }
    }
}

/// Engine safety state. `Halted` only clears via an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Active,
    Alert,
    Halted,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Active => write!(f, "ACTIVE"),
            EngineState::Alert => write!(f, "ALERT"),
            EngineState::Halted => write!(f, "HALTED"),
        }
    }
}

/// The sole object returned to the execution collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub request_id: Uuid,
    pub instrument: String,
    pub action: TradeAction,
    pub confidence: f64,
    pub breakdown: ConfidenceBreakdown,
    /// Suggested position size as a fraction of the caller's maximum.
    /// Zero whenever `action` is `Skip`.
    pub position_multiplier: f64,
    pub risk: RiskMetrics,
    pub engine_state: EngineState,
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} conf={:.2} size×{:.2} ({})",
            self.instrument,
            self.action,
            self.engine_state,
            self.confidence,
            self.position_multiplier,
            self.rationale,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PIE.
///
/// A halted engine is not represented here: `evaluate()` on a halted bus
/// yields a Skip decision through the normal channel.
#[derive(Debug, thiserror::Error)]
pub enum PieError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Unsupported snapshot schema version {found} (expected {expected})")]
    UnsupportedSchema { found: u32, expected: u32 },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
