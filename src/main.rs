//! PIE — Predictive Integrity Engine
//!
//! Demo harness. Loads configuration, initialises structured logging, and
//! runs a decide→settle loop over synthetic market snapshots so the full
//! agent→calibrator→scorer→safety path can be watched live. The engine
//! core takes no market data itself; this binary plays the data feed and
//! the execution venue at once.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use pie::bus::IntegrityBus;
use pie::config::EngineConfig;
use pie::types::{feature, EngineState, MarketSnapshot, TradeAction};

const BANNER: &str = r#"
 ____ ___ _____
|  _ \_ _| ____|
| |_) | ||  _|
|  __/| || |___
|_|  |___|_____|

  Predictive Integrity Engine
  v0.1.0 — decision core demo
"#;

#[tokio::main]
async fn main() -> Result<()> {
    let config = if Path::new("config.toml").exists() {
        EngineConfig::load("config.toml")?
    } else {
        EngineConfig::default()
    };

    init_logging();
    println!("{BANNER}");
    info!(
        n_scenarios = config.simulator.n_scenarios,
        confidence_threshold = config.scorer.confidence_threshold,
        window_capacity = config.window.capacity,
        "PIE starting up"
    );

    let mut bus = IntegrityBus::new(config);
    let mut rng = StdRng::seed_from_u64(7);
    let mut equity = 10_000.0_f64;
    let mut tick = 0_u64;

    let mut interval = tokio::time::interval(Duration::from_secs(2));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Entering demo loop. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick += 1;
                let snapshot = synthetic_snapshot(&mut rng);
                match bus.evaluate(&snapshot).await {
                    Ok(decision) => {
                        info!(tick, %decision, "Decision");
                        if decision.action == TradeAction::Trade {
                            // Settle immediately against a hidden edge so
                            // calibration and the safety machine get fed
                            let realized = rng.gen_bool(0.6);
                            let stake = equity * 0.01 * decision.position_multiplier;
                            equity += if realized { stake } else { -stake };
                            if let Err(e) =
                                bus.record_outcome(decision.request_id, realized, equity)
                            {
                                error!(error = %e, "Failed to record outcome");
                            }
                        }
                        if bus.state() == EngineState::Halted {
                            info!("Engine halted; resetting for demo purposes");
                            bus.reset();
                        }
                    }
                    Err(e) => error!(error = %e, "Evaluation failed"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    let stats = bus.stats();
    info!(
        decisions = stats.decisions,
        trades = stats.trades,
        outcomes = stats.outcomes,
        wins = stats.wins,
        equity = format!("${equity:.2}"),
        state = %stats.state,
        "PIE shut down cleanly."
    );
    Ok(())
}

/// A plausible random snapshot covering every feature the agents read.
fn synthetic_snapshot(rng: &mut StdRng) -> MarketSnapshot {
    let price = 100.0 + rng.gen_range(-5.0..5.0);
    let prices: Vec<f64> = (0..24)
        .map(|_| price + rng.gen_range(-2.0..2.0))
        .collect();
    let vols: Vec<f64> = (0..8).map(|_| rng.gen_range(0.01..0.04)).collect();
    let pattern = ["bull_flag", "bear_flag", "double_bottom", "none"]
        [rng.gen_range(0..4)];

    MarketSnapshot::new("BTC-USD")
        .with_num(feature::RSI, rng.gen_range(20.0..80.0))
        .with_num(feature::MACD, rng.gen_range(-1.0..1.0))
        .with_num(feature::MACD_SIGNAL, rng.gen_range(-1.0..1.0))
        .with_num(feature::PRICE, price)
        .with_num(feature::BOLLINGER_UPPER, price + 3.0)
        .with_num(feature::BOLLINGER_LOWER, price - 3.0)
        .with_num(feature::MA_SHORT, price + rng.gen_range(-1.0..1.0))
        .with_num(feature::MA_LONG, price + rng.gen_range(-1.0..1.0))
        .with_num(feature::VOLUME, rng.gen_range(500.0..2500.0))
        .with_num(feature::AVG_VOLUME, 1_000.0)
        .with_num(feature::TREND_STRENGTH, rng.gen_range(-1.0..1.0))
        .with_num(feature::SENTIMENT, rng.gen_range(-1.0..1.0))
        .with_num(feature::VOLATILITY, rng.gen_range(0.01..0.03))
        .with_num(feature::HISTORICAL_VOLATILITY, 0.02)
        .with_num(feature::SPREAD, rng.gen_range(0.01..0.05))
        .with_num(feature::AVG_SPREAD, 0.03)
        .with_num(feature::CORRELATION_INDEX, rng.gen_range(-1.0..1.0))
        .with_num(feature::CORRELATION_SECTOR, rng.gen_range(-1.0..1.0))
        .with_num(feature::FRACTAL_DIMENSION, rng.gen_range(1.0..2.0))
        .with_series(feature::PRICE_HISTORY, prices)
        .with_series(feature::VOLATILITY_HISTORY, vols)
        .with_tag(feature::CHART_PATTERN, pattern)
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pie=info"));

    if std::env::var("PIE_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
