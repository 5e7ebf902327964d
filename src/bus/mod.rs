//! Integrity Bus — the single entry point of the engine.
//!
//! Owns the agents, calibrator, scorer, performance window, and safety
//! monitor. `evaluate` fans a snapshot out to the agents concurrently and
//! folds the results into one Decision; `record_outcome` closes the loop by
//! feeding realized results back into calibration and the safety machine.
//! Both take `&mut self`, so all feedback is serialized by construction.

pub mod safety;
pub mod window;

use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::Utc;
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::agents::{chaos::ChaosAgent, regime::RegimeAgent, technical::TechnicalAgent, Agent};
use crate::calibrator::BayesianCalibrator;
use crate::config::EngineConfig;
use crate::scorer::ConfidenceScorer;
use crate::types::{Decision, EngineState, MarketSnapshot, PieError, TradeAction};
use safety::SafetyMonitor;
use window::PerformanceWindow;

/// Oldest pending requests are dropped past this bound; callers that never
/// report outcomes must not leak memory here.
const MAX_PENDING: usize = 1024;

/// Per-agent predicted values held until the outcome is reported.
struct PendingRequest {
    agent_values: Vec<(String, f64)>,
    ensemble_value: f64,
    confidence: f64,
}

/// Read-only operational summary.
#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    pub decisions: u64,
    pub trades: u64,
    pub outcomes: u64,
    pub wins: u64,
    pub win_rate: Option<f64>,
    pub avg_confidence: Option<f64>,
    pub consecutive_losses: u32,
    pub state: EngineState,
    pub weights: HashMap<String, f64>,
}

pub struct IntegrityBus {
    config: EngineConfig,
    agents: Vec<Box<dyn Agent>>,
    calibrator: BayesianCalibrator,
    scorer: ConfidenceScorer,
    window: PerformanceWindow,
    safety: SafetyMonitor,
    pending: HashMap<Uuid, PendingRequest>,
    pending_order: VecDeque<Uuid>,
    peak_equity: Option<f64>,
    decisions: u64,
    trades: u64,
    outcomes: u64,
    wins: u64,
}

impl IntegrityBus {
    /// Bus with the standard agent roster.
    pub fn new(config: EngineConfig) -> Self {
        let agents: Vec<Box<dyn Agent>> = vec![
            Box::new(TechnicalAgent::new(config.simulator.clone())),
            Box::new(RegimeAgent::new(config.simulator.clone())),
            Box::new(ChaosAgent::new(config.simulator.clone())),
        ];
        Self::with_agents(config, agents)
    }

    /// Bus over a caller-supplied agent roster.
    pub fn with_agents(config: EngineConfig, agents: Vec<Box<dyn Agent>>) -> Self {
        let names: Vec<&str> = agents.iter().map(|a| a.name()).collect();
        let calibrator = BayesianCalibrator::new(config.calibrator.clone(), &names);
        let scorer = ConfidenceScorer::new(config.scorer.clone());
        let window = PerformanceWindow::new(config.window.capacity);
        let safety = SafetyMonitor::new(config.safety.clone());
        Self {
            config,
            agents,
            calibrator,
            scorer,
            window,
            safety,
            pending: HashMap::new(),
            pending_order: VecDeque::new(),
            peak_equity: None,
            decisions: 0,
            trades: 0,
            outcomes: 0,
            wins: 0,
        }
    }

    /// Evaluates one market snapshot into a Decision.
    ///
    /// Runs every agent concurrently, combines them under the current
    /// weights, fuses the confidence score, and applies the safety state:
    /// HALTED (and, in strict mode, ALERT) forces a Skip; otherwise ALERT
    /// damps the position multiplier.
    pub async fn evaluate(&mut self, snapshot: &MarketSnapshot) -> Result<Decision, PieError> {
        snapshot.validate()?;

        let predictions =
            try_join_all(self.agents.iter().map(|agent| agent.predict(snapshot))).await?;

        // Count distinct missing names before `combine` takes the
        // predictions by value.
        let missing_count = predictions
            .iter()
            .flat_map(|p| p.missing_features.iter().map(String::as_str))
            .collect::<BTreeSet<&str>>()
            .len();
        let ensemble = self.calibrator.combine(predictions)?;
        let score = self
            .scorer
            .score(&ensemble, self.window.win_rate(), missing_count);
        let (mut action, mut multiplier) = self.scorer.decide(&score);

        let state = self.safety.state();
        let mut rationale = format!(
            "{} confidence {:.2}, consensus {:.2}",
            score.level, score.value, ensemble.consensus_strength
        );
        match state {
            EngineState::Halted => {
                action = TradeAction::Skip;
                multiplier = 0.0;
                rationale = "engine halted, awaiting manual reset".to_string();
            }
            EngineState::Alert if self.config.safety.skip_on_alert => {
                action = TradeAction::Skip;
                multiplier = 0.0;
                rationale = format!("alert state, strict mode ({rationale})");
            }
            EngineState::Alert => {
                multiplier *= self.config.safety.alert_damping;
                rationale = format!("alert state, position damped ({rationale})");
            }
            EngineState::Active => {}
        }

        let request_id = Uuid::new_v4();
        self.register_pending(
            request_id,
            PendingRequest {
                agent_values: ensemble
                    .agent_predictions
                    .iter()
                    .map(|p| (p.agent.clone(), p.value))
                    .collect(),
                ensemble_value: ensemble.value,
                confidence: score.value,
            },
        );

        self.decisions += 1;
        if action == TradeAction::Trade {
            self.trades += 1;
        }
        debug!(
            %request_id,
            instrument = %snapshot.instrument,
            %action,
            confidence = score.value,
            multiplier,
            %state,
            "Decision issued"
        );

        Ok(Decision {
            request_id,
            instrument: snapshot.instrument.clone(),
            action,
            confidence: score.value,
            breakdown: score.breakdown,
            position_multiplier: multiplier,
            risk: ensemble.risk,
            engine_state: state,
            rationale,
            timestamp: Utc::now(),
        })
    }

    /// Reports the realized outcome of a previous decision.
    ///
    /// Feeds each agent's recorded prediction into calibration, appends to
    /// the performance window, updates the drawdown tracker, and re-runs the
    /// safety state machine. `equity` is the caller's current account value.
    pub fn record_outcome(
        &mut self,
        request_id: Uuid,
        realized: bool,
        equity: f64,
    ) -> Result<(), PieError> {
        let pending = self.pending.remove(&request_id).ok_or_else(|| {
            PieError::InvalidParameter(format!("unknown request id: {request_id}"))
        })?;
        self.pending_order.retain(|id| *id != request_id);

        let actual = if realized { 1.0 } else { 0.0 };
        for (agent, predicted) in &pending.agent_values {
            self.calibrator.update(agent, *predicted, actual)?;
        }

        self.window.push(realized, pending.confidence);
        self.outcomes += 1;
        if realized {
            self.wins += 1;
        }

        let peak = self.peak_equity.map_or(equity, |p| p.max(equity));
        self.peak_equity = Some(peak);
        let drawdown = if peak > 0.0 { (peak - equity) / peak } else { 0.0 };

        let state = self.safety.observe(realized, &self.window, drawdown);
        info!(
            %request_id,
            realized,
            predicted = pending.ensemble_value,
            equity,
            drawdown,
            %state,
            "Outcome recorded"
        );
        Ok(())
    }

    /// Manual HALTED → ACTIVE recovery. Streak bookkeeping and the drawdown
    /// baseline are cleared; weights and the window are kept.
    pub fn reset(&mut self) {
        self.safety.reset();
        self.peak_equity = None;
    }

    /// Drops all error tracks and restores uniform weights.
    pub fn recalibrate(&mut self) {
        self.calibrator.recalibrate();
    }

    pub fn state(&self) -> EngineState {
        self.safety.state()
    }

    pub fn weights(&self) -> HashMap<String, f64> {
        self.calibrator.weights()
    }

    pub fn window(&self) -> &PerformanceWindow {
        &self.window
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            decisions: self.decisions,
            trades: self.trades,
            outcomes: self.outcomes,
            wins: self.wins,
            win_rate: self.window.win_rate(),
            avg_confidence: self.window.avg_confidence(),
            consecutive_losses: self.window.consecutive_losses(),
            state: self.safety.state(),
            weights: self.calibrator.weights(),
        }
    }

    fn register_pending(&mut self, request_id: Uuid, request: PendingRequest) {
        if self.pending_order.len() == MAX_PENDING {
            if let Some(oldest) = self.pending_order.pop_front() {
                self.pending.remove(&oldest);
            }
        }
        self.pending.insert(request_id, request);
        self.pending_order.push_back(request_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::MockAgent;
    use crate::types::{AgentPrediction, RiskMetrics};
    use std::collections::BTreeMap;

    fn stub_prediction(name: &str, value: f64, confidence: f64) -> AgentPrediction {
        AgentPrediction {
            agent: name.to_string(),
            value,
            confidence,
            base_value: value,
            base_confidence: confidence,
            sub_scores: BTreeMap::new(),
            missing_features: Vec::new(),
            risk: RiskMetrics {
                mean: value,
                std: 0.01,
                var_95: value - 0.02,
                var_99: value - 0.03,
                probability_of_loss: 1.0 - value,
                probability_of_profit: value,
                n_scenarios: 1000,
            },
            reasoning: String::new(),
        }
    }

    fn stub_agent(name: &'static str, value: f64, confidence: f64) -> Box<dyn Agent> {
        let mut agent = MockAgent::new();
        agent.expect_name().return_const(name);
        agent
            .expect_predict()
            .returning(move |_| Ok(stub_prediction(name, value, confidence)));
        Box::new(agent)
    }

    fn make_bus(value: f64, confidence: f64) -> IntegrityBus {
        IntegrityBus::with_agents(
            EngineConfig::default(),
            vec![
                stub_agent("technical", value, confidence),
                stub_agent("regime", value, confidence),
                stub_agent("chaos", value, confidence),
            ],
        )
    }

    #[tokio::test]
    async fn test_strong_agreement_trades() {
        let mut bus = make_bus(0.9, 0.9);
        let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
        // consensus 1.0, P(profit) 0.9, neutral history 0.5, full quality:
        // 0.30 + 0.27 + 0.125 + 0.15 = 0.845
        assert_eq!(decision.action, TradeAction::Trade);
        assert!((decision.confidence - 0.845).abs() < 1e-12);
        assert!(decision.position_multiplier > 0.3);
        assert_eq!(decision.engine_state, EngineState::Active);
    }

    #[tokio::test]
    async fn test_weak_signal_skips() {
        // Unanimous agents keep consensus at 1.0, so the value has to be
        // low enough to drag the fused score under the threshold.
        let mut bus = make_bus(0.4, 0.5);
        let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
        assert_eq!(decision.action, TradeAction::Skip);
        assert_eq!(decision.position_multiplier, 0.0);
    }

    #[tokio::test]
    async fn test_distinct_missing_features_penalize_quality() {
        let gappy_agent = |name: &'static str, gaps: Vec<&str>| -> Box<dyn Agent> {
            let gaps: Vec<String> = gaps.into_iter().map(String::from).collect();
            let mut agent = MockAgent::new();
            agent.expect_name().return_const(name);
            agent.expect_predict().returning(move |_| {
                let mut pred = stub_prediction(name, 0.9, 0.9);
                pred.missing_features = gaps.clone();
                Ok(pred)
            });
            Box::new(agent)
        };
        let mut bus = IntegrityBus::with_agents(
            EngineConfig::default(),
            vec![
                gappy_agent("technical", vec!["rsi", "macd"]),
                gappy_agent("regime", vec!["macd", "spread"]),
                gappy_agent("chaos", vec![]),
            ],
        );
        let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
        // Three distinct names across the agents → 1.0 − 3 × 0.05
        assert!((decision.breakdown.data_quality - 0.85).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_malformed_snapshot_rejected() {
        let mut bus = make_bus(0.9, 0.9);
        let err = bus.evaluate(&MarketSnapshot::new("")).await.unwrap_err();
        assert!(matches!(err, PieError::MalformedSnapshot(_)));
    }

    #[tokio::test]
    async fn test_unknown_request_id_rejected() {
        let mut bus = make_bus(0.9, 0.9);
        let err = bus.record_outcome(Uuid::new_v4(), true, 100.0).unwrap_err();
        assert!(matches!(err, PieError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_outcome_double_report_rejected() {
        let mut bus = make_bus(0.9, 0.9);
        let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
        bus.record_outcome(decision.request_id, true, 100.0).unwrap();
        assert!(bus.record_outcome(decision.request_id, true, 100.0).is_err());
    }

    #[tokio::test]
    async fn test_consecutive_losses_halt_forces_skip() {
        let mut bus = make_bus(0.9, 0.9);
        for _ in 0..5 {
            let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
            bus.record_outcome(decision.request_id, false, 100.0).unwrap();
        }
        assert_eq!(bus.state(), EngineState::Halted);

        let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
        assert_eq!(decision.action, TradeAction::Skip);
        assert_eq!(decision.position_multiplier, 0.0);
        assert_eq!(decision.engine_state, EngineState::Halted);

        bus.reset();
        assert_eq!(bus.state(), EngineState::Active);
        let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
        assert_eq!(decision.action, TradeAction::Trade);
    }

    #[tokio::test]
    async fn test_drawdown_halt() {
        let mut bus = make_bus(0.9, 0.9);
        let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
        bus.record_outcome(decision.request_id, true, 100.0).unwrap();
        let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
        bus.record_outcome(decision.request_id, true, 70.0).unwrap();
        assert_eq!(bus.state(), EngineState::Halted);
    }

    #[tokio::test]
    async fn test_alert_damps_multiplier() {
        let mut bus = make_bus(0.9, 0.9);
        let active = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();

        // Alternating outcomes: win rate 0.5 lands between the halt floor
        // and the alert line once min_samples is reached.
        for i in 0..10 {
            let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
            bus.record_outcome(decision.request_id, i % 2 == 0, 100.0)
                .unwrap();
        }
        assert_eq!(bus.state(), EngineState::Alert);

        let alert = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
        assert_eq!(alert.action, TradeAction::Trade);
        assert!(alert.position_multiplier < active.position_multiplier);
        assert_eq!(alert.engine_state, EngineState::Alert);
    }

    #[tokio::test]
    async fn test_strict_mode_skips_on_alert() {
        let mut config = EngineConfig::default();
        config.safety.skip_on_alert = true;
        let mut bus = IntegrityBus::with_agents(
            config,
            vec![
                stub_agent("technical", 0.9, 0.9),
                stub_agent("regime", 0.9, 0.9),
                stub_agent("chaos", 0.9, 0.9),
            ],
        );
        for i in 0..10 {
            let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
            bus.record_outcome(decision.request_id, i % 2 == 0, 100.0)
                .unwrap();
        }
        assert_eq!(bus.state(), EngineState::Alert);
        let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
        assert_eq!(decision.action, TradeAction::Skip);
        assert_eq!(decision.position_multiplier, 0.0);
    }

    #[tokio::test]
    async fn test_outcomes_move_weights() {
        let mut bus = IntegrityBus::with_agents(
            EngineConfig::default(),
            vec![
                stub_agent("technical", 0.95, 0.9),
                stub_agent("regime", 0.5, 0.9),
                stub_agent("chaos", 0.5, 0.9),
            ],
        );
        for _ in 0..20 {
            let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
            bus.record_outcome(decision.request_id, true, 100.0).unwrap();
        }
        let weights = bus.weights();
        assert!(weights["technical"] > weights["regime"]);
        assert!(weights["technical"] > 0.5);

        bus.recalibrate();
        let uniform = bus.weights();
        assert!((uniform["technical"] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_stats_track_activity() {
        let mut bus = make_bus(0.9, 0.9);
        let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
        bus.record_outcome(decision.request_id, true, 100.0).unwrap();
        bus.evaluate(&MarketSnapshot::sample()).await.unwrap();

        let stats = bus.stats();
        assert_eq!(stats.decisions, 2);
        assert_eq!(stats.trades, 2);
        assert_eq!(stats.outcomes, 1);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.win_rate, Some(1.0));
        assert_eq!(stats.state, EngineState::Active);
    }

    #[tokio::test]
    async fn test_stats_expose_loss_streak_across_reset() {
        let mut bus = make_bus(0.9, 0.9);
        for _ in 0..5 {
            let decision = bus.evaluate(&MarketSnapshot::sample()).await.unwrap();
            bus.record_outcome(decision.request_id, false, 100.0).unwrap();
        }
        assert_eq!(bus.stats().consecutive_losses, 5);
        assert_eq!(bus.state(), EngineState::Halted);

        // reset() clears the monitor's streak but not the window's history
        bus.reset();
        assert_eq!(bus.state(), EngineState::Active);
        assert_eq!(bus.stats().consecutive_losses, 5);
    }

    #[tokio::test]
    async fn test_agent_error_propagates() {
        let mut failing = MockAgent::new();
        failing.expect_name().return_const("technical");
        failing.expect_predict().returning(|_| {
            Err(PieError::InvalidParameter("volatility out of range".into()))
        });
        let mut bus = IntegrityBus::with_agents(
            EngineConfig::default(),
            vec![
                Box::new(failing),
                stub_agent("regime", 0.9, 0.9),
                stub_agent("chaos", 0.9, 0.9),
            ],
        );
        let err = bus.evaluate(&MarketSnapshot::sample()).await.unwrap_err();
        assert!(matches!(err, PieError::InvalidParameter(_)));
    }
}
