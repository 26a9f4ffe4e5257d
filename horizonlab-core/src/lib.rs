//! HorizonLab Core — domain types, oracle capability, entropy guard, simulator.
//!
//! This crate contains the causal half of the engine:
//! - Domain types (bars, horizon signals, positions, trades, horizon weights)
//! - Cost and risk parameters, including the drawdown exposure multiplier
//! - The `Forecaster` and `PriceStore` capabilities the simulator consumes
//! - Entropy guard and telemetry
//! - Walk-forward simulator with stop-loss, forced exits and sizing rules
//! - Deterministic RNG hierarchy used by the resampling and search layers

pub mod domain;
pub mod engine;
pub mod entropy_guard;
pub mod metrics;
pub mod oracle;
pub mod params;
pub mod rng;
pub mod store;
pub mod telemetry;
