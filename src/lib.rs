//! PIE — Predictive Integrity Engine
//!
//! Library crate exposing the prediction pipeline for use by
//! integration tests and the binary entry point.

pub mod config;
pub mod types;
pub mod simulator;
pub mod agents;
pub mod calibrator;
pub mod scorer;
pub mod bus;
