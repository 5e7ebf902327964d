//! Configuration loading from TOML.
//!
//! Every component carries a documented `Default`; a TOML file may override
//! any subset of sections. The engine is fully usable with
//! `EngineConfig::default()` — the file is optional tuning, not a requirement.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

// ---------------------------------------------------------------------------
// Component configs
// ---------------------------------------------------------------------------

/// Scenario simulator tuning.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Number of Monte Carlo draws per prediction.
    pub n_scenarios: usize,
    /// Outcomes below this value count as losses.
    pub breakeven_threshold: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            n_scenarios: 10_000,
            breakeven_threshold: 0.5,
        }
    }
}

/// Confidence fusion and decision-rule tuning.
///
/// The four component weights must sum to 1.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScorerConfig {
    /// Weight of the cross-agent consensus component.
    pub consensus_weight: f64,
    /// Weight of the simulated probability-of-profit component.
    pub profit_weight: f64,
    /// Weight of the realized win rate over the performance window.
    pub accuracy_weight: f64,
    /// Weight of the data-quality component (1 − penalty).
    pub quality_weight: f64,
    /// Minimum confidence for a TRADE decision.
    pub confidence_threshold: f64,
    /// Position multiplier at exactly the threshold.
    pub min_position_multiplier: f64,
    /// Cap on the position multiplier.
    pub max_position_multiplier: f64,
    /// Confidence at which the multiplier reaches its cap.
    pub full_confidence: f64,
    /// Quality penalty per distinct missing feature name.
    pub missing_feature_penalty: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            consensus_weight: 0.30,
            profit_weight: 0.30,
            accuracy_weight: 0.25,
            quality_weight: 0.15,
            confidence_threshold: 0.70,
            min_position_multiplier: 0.3,
            max_position_multiplier: 1.0,
            full_confidence: 0.95,
            missing_feature_penalty: 0.05,
        }
    }
}

/// Calibrator learning parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibratorConfig {
    /// EWMA learning rate for per-agent squared error. Higher forgets faster.
    pub alpha: f64,
    /// Softmax temperature for weight recomputation. Lower sharpens weights.
    pub temperature: f64,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            temperature: 0.05,
        }
    }
}

/// Safety state-machine thresholds.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SafetyConfig {
    /// Rolling win rate below this enters ALERT.
    pub alert_win_rate: f64,
    /// Rolling average confidence below this enters ALERT.
    pub clarity_threshold: f64,
    /// Rolling win rate below this halts the engine.
    pub halt_win_rate: f64,
    /// Consecutive losses that halt the engine.
    pub max_consecutive_losses: u32,
    /// Drawdown from peak equity that halts the engine.
    pub max_drawdown: f64,
    /// Consecutive healthy outcomes required to leave ALERT.
    pub recovery_streak: u32,
    /// Outcomes required before win-rate transitions are evaluated.
    pub min_samples: usize,
    /// Force SKIP decisions while in ALERT (strict mode). When false, ALERT
    /// keeps trading with the position multiplier damped.
    pub skip_on_alert: bool,
    /// Position-multiplier damping applied during ALERT.
    pub alert_damping: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            alert_win_rate: 0.55,
            clarity_threshold: 0.60,
            halt_win_rate: 0.40,
            max_consecutive_losses: 5,
            max_drawdown: 0.25,
            recovery_streak: 10,
            min_samples: 10,
            skip_on_alert: false,
            alert_damping: 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub simulator: SimulatorConfig,
    pub scorer: ScorerConfig,
    pub calibrator: CalibratorConfig,
    pub safety: SafetyConfig,
    pub window: WindowConfig,
}

/// Performance-window sizing.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowConfig {
    /// Maximum retained outcomes; oldest evicted on overflow.
    pub capacity: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { capacity: 50 }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: EngineConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate().context("Invalid engine configuration")?;
        Ok(config)
    }

    /// Cross-field sanity checks applied after deserialization.
    pub fn validate(&self) -> Result<()> {
        let weight_sum = self.scorer.consensus_weight
            + self.scorer.profit_weight
            + self.scorer.accuracy_weight
            + self.scorer.quality_weight;
        anyhow::ensure!(
            (weight_sum - 1.0).abs() < 1e-9,
            "scorer component weights must sum to 1 (got {weight_sum})"
        );
        anyhow::ensure!(
            self.simulator.n_scenarios >= 1,
            "simulator.n_scenarios must be at least 1"
        );
        anyhow::ensure!(
            self.safety.halt_win_rate <= self.safety.alert_win_rate,
            "safety.halt_win_rate must not exceed safety.alert_win_rate"
        );
        anyhow::ensure!(self.window.capacity > 0, "window.capacity must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.simulator.n_scenarios, 10_000);
        assert_eq!(cfg.safety.max_consecutive_losses, 5);
        assert_eq!(cfg.window.capacity, 50);
        assert!((cfg.scorer.confidence_threshold - 0.70).abs() < 1e-12);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let toml_str = r#"
            [simulator]
            n_scenarios = 500

            [safety]
            max_consecutive_losses = 3
        "#;
        let cfg: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.simulator.n_scenarios, 500);
        assert_eq!(cfg.safety.max_consecutive_losses, 3);
        // Untouched sections keep their defaults
        assert!((cfg.scorer.consensus_weight - 0.30).abs() < 1e-12);
        assert_eq!(cfg.window.capacity, 50);
    }

    #[test]
    fn test_bad_scorer_weights_rejected() {
        let toml_str = r#"
            [scorer]
            consensus_weight = 0.9
        "#;
        let cfg: EngineConfig = toml::from_str(toml_str).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_scenarios_rejected() {
        let toml_str = r#"
            [simulator]
            n_scenarios = 0
        "#;
        let cfg: EngineConfig = toml::from_str(toml_str).unwrap();
        assert!(cfg.validate().is_err());
    }
}
