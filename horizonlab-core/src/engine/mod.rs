//! Walk-forward simulator — causal step loop and its supporting types.
//!
//! A run owns all of its mutable state (`SimState`, entropy-guard EMA,
//! telemetry). Nothing is shared between runs, so many runs can execute on a
//! worker pool against the same bars and forecaster.

pub mod loop_runner;
pub mod result;
pub mod state;

pub use loop_runner::{entry_size, forced_exit, simulate};
pub use result::{
    ConsensusStats, EntropyStats, EquityPoint, EquitySample, SimMetrics, SimResult, YearMetrics,
};
pub use state::{SimConfig, SimError, SimState};
