//! Certification — rolling walk-forward validation AND Monte Carlo.
//!
//! A weight vector is certified only when both the rolling summary and the
//! Monte Carlo acceptance pass. Either one alone is never enough.

use chrono::NaiveDate;
use horizonlab_core::domain::{HorizonWeights, PriceBar};
use horizonlab_core::engine::{SimConfig, SimMetrics};
use horizonlab_core::oracle::Forecaster;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::evaluator::{CandidateError, Evaluator};
use crate::monte_carlo::{McConfig, MonteCarloResult};
use crate::rolling::{RollingError, RollingSummary, RollingValidator};

/// Date range to certify over. Open ends use all available bars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Certified,
    RollingFailed,
    MonteCarloFailed,
    BothFailed,
}

impl Verdict {
    pub fn from_gates(rolling_passed: bool, mc_passed: bool) -> Self {
        match (rolling_passed, mc_passed) {
            (true, true) => Verdict::Certified,
            (false, true) => Verdict::RollingFailed,
            (true, false) => Verdict::MonteCarloFailed,
            (false, false) => Verdict::BothFailed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertifyResult {
    pub weights: HorizonWeights,
    pub period: Period,
    pub rolling: RollingSummary,
    pub monte_carlo: MonteCarloResult,
    /// Metrics of the single full-period run the Monte Carlo was drawn from.
    pub full_period: SimMetrics,
    pub certified: bool,
    pub verdict: Verdict,
}

impl CertifyResult {
    pub fn new(
        weights: HorizonWeights,
        period: Period,
        rolling: RollingSummary,
        monte_carlo: MonteCarloResult,
        full_period: SimMetrics,
    ) -> Self {
        let verdict = Verdict::from_gates(rolling.passed, monte_carlo.passed());
        Self {
            weights,
            period,
            rolling,
            monte_carlo,
            full_period,
            certified: verdict == Verdict::Certified,
            verdict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CertifyError {
    #[error("rolling validation failed: {0}")]
    Rolling(#[from] RollingError),
    #[error("full-period evaluation failed: {0}")]
    Candidate(#[from] CandidateError),
}

/// Certifies weight vectors against one bar series and forecaster.
pub struct CertificationService<'a> {
    bars: &'a [PriceBar],
    forecaster: &'a dyn Forecaster,
    sim: &'a SimConfig,
    mc: &'a McConfig,
    rolling: &'a dyn RollingValidator,
}

impl<'a> CertificationService<'a> {
    pub fn new(
        bars: &'a [PriceBar],
        forecaster: &'a dyn Forecaster,
        sim: &'a SimConfig,
        mc: &'a McConfig,
        rolling: &'a dyn RollingValidator,
    ) -> Self {
        Self {
            bars,
            forecaster,
            sim,
            mc,
            rolling,
        }
    }

    pub fn certify(&self, weights: HorizonWeights, period: Period) -> Result<CertifyResult, CertifyError> {
        let mut sim = self.sim.clone();
        sim.horizon.weights = weights;
        sim.start = period.start.or(sim.start);
        sim.end = period.end.or(sim.end);

        let window = rolling_window(self.bars, &sim, self.forecaster.warmup_bars());
        let rolling = self.rolling.validate(window, &sim, self.forecaster)?;

        let evaluator = Evaluator::new(self.bars, self.forecaster, &sim, self.mc);
        let full = evaluator.evaluate(weights)?;

        let result = CertifyResult::new(weights, period, rolling, full.monte_carlo, full.metrics);
        info!(
            weights = %weights,
            rolling_passed = result.rolling.passed,
            mc_passed = result.monte_carlo.passed(),
            certified = result.certified,
            "certification complete"
        );
        Ok(result)
    }
}

/// Bars the rolling splits walk over: the period itself plus just enough
/// lookback before its start to warm up the forecaster.
fn rolling_window<'b>(bars: &'b [PriceBar], sim: &SimConfig, warmup: usize) -> &'b [PriceBar] {
    let hi = match sim.end {
        Some(end) => bars.partition_point(|b| b.date() <= end),
        None => bars.len(),
    };
    let lo = match sim.start {
        Some(start) => bars.partition_point(|b| b.date() < start).saturating_sub(warmup),
        None => 0,
    };
    &bars[lo.min(hi)..hi]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_truth_table() {
        assert_eq!(Verdict::from_gates(true, true), Verdict::Certified);
        assert_eq!(Verdict::from_gates(false, true), Verdict::RollingFailed);
        assert_eq!(Verdict::from_gates(true, false), Verdict::MonteCarloFailed);
        assert_eq!(Verdict::from_gates(false, false), Verdict::BothFailed);
    }
}
