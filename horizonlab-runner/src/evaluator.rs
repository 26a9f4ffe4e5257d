//! Candidate evaluation — the Simulator → Validator pipeline for one weight
//! vector.
//!
//! Every invocation clones the base `SimConfig` and swaps in the candidate's
//! weights, so evaluations share nothing mutable and can run on a worker
//! pool. A collaborator that panics is caught here and surfaced as
//! `CandidateError::Panicked`; the search layers above drop the candidate
//! and keep going.

use std::panic::{catch_unwind, AssertUnwindSafe};

use horizonlab_core::domain::{HorizonWeights, PriceBar};
use horizonlab_core::engine::{simulate, SimConfig, SimError, SimMetrics, SimResult};
use horizonlab_core::oracle::Forecaster;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monte_carlo::{self, McConfig, MonteCarloResult};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandidateError {
    #[error("simulation failed: {0}")]
    Sim(#[from] SimError),
    #[error("candidate evaluation panicked: {0}")]
    Panicked(String),
}

/// Simulator + Validator outcome for one weight vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub weights: HorizonWeights,
    pub trade_count: usize,
    pub metrics: SimMetrics,
    pub monte_carlo: MonteCarloResult,
}

/// Shared, read-only inputs for evaluating candidates.
#[derive(Clone, Copy)]
pub struct Evaluator<'a> {
    bars: &'a [PriceBar],
    forecaster: &'a dyn Forecaster,
    sim: &'a SimConfig,
    mc: &'a McConfig,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        bars: &'a [PriceBar],
        forecaster: &'a dyn Forecaster,
        sim: &'a SimConfig,
        mc: &'a McConfig,
    ) -> Self {
        Self {
            bars,
            forecaster,
            sim,
            mc,
        }
    }

    pub fn bars(&self) -> &'a [PriceBar] {
        self.bars
    }

    pub fn forecaster(&self) -> &'a dyn Forecaster {
        self.forecaster
    }

    pub fn sim_config(&self) -> &'a SimConfig {
        self.sim
    }

    pub fn mc_config(&self) -> &'a McConfig {
        self.mc
    }

    /// Base config with `weights` swapped in.
    pub fn config_for(&self, weights: HorizonWeights) -> SimConfig {
        let mut config = self.sim.clone();
        config.horizon.weights = weights;
        config
    }

    /// Simulate one candidate.
    pub fn run(&self, weights: HorizonWeights) -> Result<SimResult, CandidateError> {
        let config = self.config_for(weights);
        guarded(|| simulate(self.bars, &config, self.forecaster))?.map_err(CandidateError::from)
    }

    /// Bootstrap a finished run's trade ledger.
    pub fn validate(&self, result: &SimResult) -> Result<MonteCarloResult, CandidateError> {
        guarded(|| monte_carlo::validate(&result.trades, self.mc))
    }

    /// Full pipeline: simulate, then validate.
    pub fn evaluate(&self, weights: HorizonWeights) -> Result<Evaluation, CandidateError> {
        let result = self.run(weights)?;
        let monte_carlo = self.validate(&result)?;
        Ok(Evaluation {
            weights,
            trade_count: result.trades.len(),
            metrics: result.metrics,
            monte_carlo,
        })
    }
}

/// Run `f`, converting a panic into `CandidateError::Panicked`.
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, CandidateError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        CandidateError::Panicked(message)
    })
}
