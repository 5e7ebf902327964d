//! Prediction agents — three independent strategies, one shared contract.
//!
//! Each agent computes a base prediction from its own feature subset, then
//! refines it through the scenario simulator: confidence is blended 40/60
//! with the simulated probability of profit, value 50/50 with the simulated
//! mean. Agents are pure over the snapshot and safe to run concurrently.

pub mod technical;
pub mod regime;
pub mod chaos;

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;

use crate::simulator::ScenarioSimulator;
use crate::types::{AgentPrediction, MarketSnapshot, PieError};

/// Mixing ratio for confidence: base vs simulated probability of profit.
pub(crate) const CONFIDENCE_BASE_WEIGHT: f64 = 0.4;
pub(crate) const CONFIDENCE_SIM_WEIGHT: f64 = 0.6;
/// Mixing ratio for value: base vs simulated mean.
pub(crate) const VALUE_BASE_WEIGHT: f64 = 0.5;
pub(crate) const VALUE_SIM_WEIGHT: f64 = 0.5;

/// Abstraction over the prediction strategies.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable agent identity used for calibration bookkeeping.
    fn name(&self) -> &'static str;

    /// Compute a simulation-refined prediction from the snapshot.
    async fn predict(&self, snapshot: &MarketSnapshot) -> Result<AgentPrediction, PieError>;
}

// ---------------------------------------------------------------------------
// Feature probe
// ---------------------------------------------------------------------------

/// Snapshot reader that records every consulted-but-absent feature name.
/// Absent features leave scores at their neutral baseline; the recorded
/// names feed the downstream data-quality penalty.
pub(crate) struct FeatureProbe<'a> {
    snapshot: &'a MarketSnapshot,
    missing: Vec<String>,
}

impl<'a> FeatureProbe<'a> {
    pub fn new(snapshot: &'a MarketSnapshot) -> Self {
        Self {
            snapshot,
            missing: Vec::new(),
        }
    }

    pub fn num(&mut self, name: &str) -> Option<f64> {
        let value = self.snapshot.num(name);
        if value.is_none() {
            self.missing.push(name.to_string());
        }
        value
    }

    pub fn series(&mut self, name: &str) -> Option<&'a [f64]> {
        let value = self.snapshot.series(name);
        if value.is_none() {
            self.missing.push(name.to_string());
        }
        value
    }

    pub fn tag(&mut self, name: &str) -> Option<&'a str> {
        let value = self.snapshot.tag(name);
        if value.is_none() {
            self.missing.push(name.to_string());
        }
        value
    }

    pub fn into_missing(self) -> Vec<String> {
        self.missing
    }
}

// ---------------------------------------------------------------------------
// Shared refinement
// ---------------------------------------------------------------------------

pub(crate) fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Run the simulator on a base prediction and blend the results into the
/// final AgentPrediction.
#[allow(clippy::too_many_arguments)]
pub(crate) fn refine(
    agent: &'static str,
    base_value: f64,
    base_confidence: f64,
    volatility: f64,
    simulator: &ScenarioSimulator,
    seed: Option<u64>,
    sub_scores: BTreeMap<String, f64>,
    missing: Vec<String>,
    detail: String,
) -> Result<AgentPrediction, PieError> {
    let risk = simulator.run(base_value, volatility, seed)?;

    let confidence = clamp01(
        CONFIDENCE_BASE_WEIGHT * base_confidence
            + CONFIDENCE_SIM_WEIGHT * risk.probability_of_profit,
    );
    let value = clamp01(VALUE_BASE_WEIGHT * base_value + VALUE_SIM_WEIGHT * risk.mean);

    debug!(
        agent,
        base_value,
        value,
        base_confidence,
        confidence,
        p_loss = risk.probability_of_loss,
        "Agent prediction refined"
    );

    let reasoning = format!(
        "{detail}, loss risk {:.1}%",
        risk.probability_of_loss * 100.0
    );

    Ok(AgentPrediction {
        agent: agent.to_string(),
        value,
        confidence,
        base_value,
        base_confidence,
        sub_scores,
        missing_features: missing,
        risk,
        reasoning,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
