//! Bayesian calibrator — error-tracked ensemble weights.
//!
//! Tracks an EWMA of each agent's squared prediction error and recomputes
//! blend weights as a softmax over the negated error. An agent that keeps
//! being right sees its error decay toward zero and its weight toward one;
//! a persistently wrong agent is squeezed out. Weights always sum to 1.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::CalibratorConfig;
use crate::types::{AgentPrediction, EnsemblePrediction, PieError, RiskMetrics};

/// EWMA prior for a freshly registered agent: the error of a coin-flip
/// prediction against a binary outcome, so new agents start mid-pack.
const INITIAL_EWMA: f64 = 0.25;

struct AgentTrack {
    ewma_sq_error: f64,
    weight: f64,
    n_updates: u64,
}

pub struct BayesianCalibrator {
    config: CalibratorConfig,
    agents: HashMap<String, AgentTrack>,
}

impl BayesianCalibrator {
    /// Registers the given agent names with uniform weights.
    pub fn new(config: CalibratorConfig, agent_names: &[&str]) -> Self {
        let uniform = 1.0 / agent_names.len().max(1) as f64;
        let agents = agent_names
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    AgentTrack {
                        ewma_sq_error: INITIAL_EWMA,
                        weight: uniform,
                        n_updates: 0,
                    },
                )
            })
            .collect();
        Self { config, agents }
    }

    /// Current weight per agent.
    pub fn weights(&self) -> HashMap<String, f64> {
        self.agents
            .iter()
            .map(|(name, track)| (name.clone(), track.weight))
            .collect()
    }

    /// Folds a realized outcome into the named agent's error track and
    /// recomputes all weights. Rejects unregistered agents before touching
    /// any state.
    pub fn update(&mut self, agent: &str, predicted: f64, actual: f64) -> Result<(), PieError> {
        if !self.agents.contains_key(agent) {
            return Err(PieError::UnknownAgent(agent.to_string()));
        }

        let alpha = self.config.alpha;
        let sq_error = (predicted - actual).powi(2);
        if let Some(track) = self.agents.get_mut(agent) {
            track.ewma_sq_error = alpha * sq_error + (1.0 - alpha) * track.ewma_sq_error;
            track.n_updates += 1;
        }
        self.recompute_weights();

        debug!(agent, predicted, actual, sq_error, "Calibrator updated");
        Ok(())
    }

    /// Resets every error track and restores uniform weights.
    pub fn recalibrate(&mut self) {
        let uniform = 1.0 / self.agents.len().max(1) as f64;
        for track in self.agents.values_mut() {
            track.ewma_sq_error = INITIAL_EWMA;
            track.weight = uniform;
            track.n_updates = 0;
        }
        info!("Calibrator reset to uniform weights");
    }

    fn recompute_weights(&mut self) {
        // Softmax over negated EWMA error, shifted by the minimum for
        // numerical stability.
        let min_err = self
            .agents
            .values()
            .map(|t| t.ewma_sq_error)
            .fold(f64::INFINITY, f64::min);
        let total: f64 = self
            .agents
            .values()
            .map(|t| (-(t.ewma_sq_error - min_err) / self.config.temperature).exp())
            .sum();
        for track in self.agents.values_mut() {
            track.weight =
                (-(track.ewma_sq_error - min_err) / self.config.temperature).exp() / total;
        }
    }

    /// Weight-blends agent predictions into a single ensemble prediction.
    /// Every prediction must come from a registered agent.
    pub fn combine(
        &self,
        predictions: Vec<AgentPrediction>,
    ) -> Result<EnsemblePrediction, PieError> {
        if predictions.is_empty() {
            return Err(PieError::InvalidParameter(
                "cannot combine an empty prediction set".to_string(),
            ));
        }

        let mut total_weight = 0.0;
        let mut value = 0.0;
        let mut confidence = 0.0;
        let mut risk = RiskMetrics {
            mean: 0.0,
            std: 0.0,
            var_95: 0.0,
            var_99: 0.0,
            probability_of_loss: 0.0,
            probability_of_profit: 0.0,
            n_scenarios: 0,
        };

        for pred in &predictions {
            let w = self
                .agents
                .get(&pred.agent)
                .map(|t| t.weight)
                .ok_or_else(|| PieError::UnknownAgent(pred.agent.clone()))?;
            total_weight += w;
            value += w * pred.value;
            confidence += w * pred.confidence;
            risk.mean += w * pred.risk.mean;
            risk.std += w * pred.risk.std;
            risk.var_95 += w * pred.risk.var_95;
            risk.var_99 += w * pred.risk.var_99;
            risk.probability_of_loss += w * pred.risk.probability_of_loss;
            risk.n_scenarios = risk.n_scenarios.max(pred.risk.n_scenarios);
        }

        value /= total_weight;
        confidence /= total_weight;
        risk.mean /= total_weight;
        risk.std /= total_weight;
        risk.var_95 /= total_weight;
        risk.var_99 /= total_weight;
        risk.probability_of_loss /= total_weight;
        risk.probability_of_profit = 1.0 - risk.probability_of_loss;

        // Unweighted population variance of agent values; unanimous agents
        // give consensus 1, a wide spread pulls it toward 0.
        let n = predictions.len() as f64;
        let mean_value = predictions.iter().map(|p| p.value).sum::<f64>() / n;
        let variance = predictions
            .iter()
            .map(|p| (p.value - mean_value).powi(2))
            .sum::<f64>()
            / n;
        let consensus_strength = 1.0 / (1.0 + variance);

        Ok(EnsemblePrediction {
            value,
            confidence,
            consensus_strength,
            weights: self.weights(),
            risk,
            agent_predictions: predictions,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
