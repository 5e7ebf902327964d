//! Monte Carlo scenario simulator.
//!
//! Draws a bounded batch of simulated outcomes around a base prediction and
//! reduces it to `RiskMetrics`. Pure over its inputs: given an explicit seed
//! the result is bit-identical across runs and thread counts.
//!
//! Noise model: each draw is `clamp(base + N(0, volatility), 0, 1)` —
//! Gaussian noise around the base prediction, clipped so outcomes stay
//! interpretable as probabilities. Outcomes below the breakeven threshold
//! count as losses.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use tracing::debug;

use crate::config::SimulatorConfig;
use crate::types::{PieError, RiskMetrics};

pub struct ScenarioSimulator {
    config: SimulatorConfig,
}

impl ScenarioSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Simulate with the configured batch size.
    pub fn run(
        &self,
        base_prediction: f64,
        volatility: f64,
        seed: Option<u64>,
    ) -> Result<RiskMetrics, PieError> {
        self.simulate(base_prediction, volatility, self.config.n_scenarios, seed)
    }

    /// Simulate `n` scenarios around `base_prediction` and reduce to metrics.
    ///
    /// With `Some(seed)`, draw `i` uses an RNG seeded from
    /// `seed.wrapping_add(i)`, so batch generation parallelizes without
    /// affecting reproducibility. With `None`, a base seed is taken from
    /// process entropy and the same path runs.
    pub fn simulate(
        &self,
        base_prediction: f64,
        volatility: f64,
        n: usize,
        seed: Option<u64>,
    ) -> Result<RiskMetrics, PieError> {
        if !(0.0..=1.0).contains(&base_prediction) {
            return Err(PieError::InvalidParameter(format!(
                "base_prediction must be in [0,1], got {base_prediction}"
            )));
        }
        if !volatility.is_finite() || volatility < 0.0 {
            return Err(PieError::InvalidParameter(format!(
                "volatility must be finite and >= 0, got {volatility}"
            )));
        }
        if n < 1 {
            return Err(PieError::InvalidParameter(
                "scenario count must be at least 1".to_string(),
            ));
        }

        let breakeven = self.config.breakeven_threshold;

        // Zero volatility degenerates to the base prediction exactly.
        if volatility == 0.0 {
            let probability_of_loss = if base_prediction < breakeven { 1.0 } else { 0.0 };
            return Ok(RiskMetrics {
                mean: base_prediction,
                std: 0.0,
                var_95: base_prediction,
                var_99: base_prediction,
                probability_of_loss,
                probability_of_profit: 1.0 - probability_of_loss,
                n_scenarios: n,
            });
        }

        let base_seed = seed.unwrap_or_else(rand::random::<u64>);
        let noise = Normal::new(0.0, volatility)
            .map_err(|e| PieError::InvalidParameter(format!("bad noise model: {e}")))?;

        // Independent draws, one RNG per draw — order-stable under rayon.
        let draws: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(i as u64));
                (base_prediction + noise.sample(&mut rng)).clamp(0.0, 1.0)
            })
            .collect();

        // Reduction happens sequentially over the ordered batch so seeded
        // runs stay bit-identical regardless of thread scheduling.
        let metrics = reduce(&draws, breakeven);

        debug!(
            base = base_prediction,
            volatility,
            n,
            mean = metrics.mean,
            p_loss = metrics.probability_of_loss,
            "Scenario batch reduced"
        );

        Ok(metrics)
    }
}

/// Reduce an ordered scenario batch to risk metrics.
fn reduce(draws: &[f64], breakeven: f64) -> RiskMetrics {
    let n = draws.len();
    let mean = draws.iter().sum::<f64>() / n as f64;
    let variance = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n as f64;
    let std = variance.sqrt();

    let mut sorted = draws.to_vec();
    sorted.sort_by(f64::total_cmp);

    let losses = sorted.iter().take_while(|d| **d < breakeven).count();
    let probability_of_loss = losses as f64 / n as f64;

    RiskMetrics {
        mean,
        std,
        var_95: percentile(&sorted, 0.05),
        var_99: percentile(&sorted, 0.01),
        probability_of_loss,
        probability_of_profit: 1.0 - probability_of_loss,
        n_scenarios: n,
    }
}

/// Empirical quantile of a sorted batch.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let idx = ((sorted.len() as f64) * q).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
