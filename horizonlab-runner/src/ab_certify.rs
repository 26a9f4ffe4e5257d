//! A/B certification — the same pipeline run on two configs that differ in
//! one toggle, compared by tail risk, Sharpe and CAGR.
//!
//! Deltas are always B − A, with A the control and B the treatment. A
//! negative `p95_max_dd` delta means B has the thinner drawdown tail.

use horizonlab_core::domain::{HorizonWeights, PriceBar};
use horizonlab_core::engine::SimConfig;
use horizonlab_core::entropy_guard::EntropyGuardConfig;
use horizonlab_core::oracle::Forecaster;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::evaluator::{CandidateError, Evaluation, Evaluator};
use crate::monte_carlo::McConfig;

/// Which switch separates the two arms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbToggle {
    /// A runs with the entropy guard disabled, B with it enabled.
    #[default]
    EntropyGuard,
    /// A and B are identical. Useful as a null check.
    None,
}

impl AbToggle {
    /// Deep-clone `base` into the (A, B) pair.
    pub fn arms(self, base: &SimConfig) -> (SimConfig, SimConfig) {
        let mut a = base.clone();
        let mut b = base.clone();
        if self == AbToggle::EntropyGuard {
            let enabled = if base.guard.enabled {
                base.guard.clone()
            } else {
                EntropyGuardConfig {
                    enabled: true,
                    ..base.guard.clone()
                }
            };
            a.guard = EntropyGuardConfig {
                enabled: false,
                ..enabled.clone()
            };
            b.guard = enabled;
        }
        (a, b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbThresholds {
    /// B must cut `p95_max_dd` by at least this much to be enabled.
    pub min_tail_improvement: f64,
    /// ... while giving up at most this much Sharpe.
    pub max_sharpe_cost: f64,
    /// Deltas all smaller than these count as no difference.
    pub negligible_drawdown: f64,
    pub negligible_sharpe: f64,
    pub negligible_cagr: f64,
}

impl Default for AbThresholds {
    fn default() -> Self {
        Self {
            min_tail_improvement: 0.05,
            max_sharpe_cost: 0.15,
            negligible_drawdown: 0.01,
            negligible_sharpe: 0.05,
            negligible_cagr: 0.005,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    /// B cuts tail risk enough at an acceptable Sharpe cost.
    Enable,
    /// B costs Sharpe without a meaningful tail improvement.
    Disable,
    /// B improves one dimension at a material cost in another.
    TradeOff,
    NoMaterialDifference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmSummary {
    pub label: String,
    pub sharpe: f64,
    pub cagr: f64,
    pub p95_max_dd: f64,
    pub trade_count: usize,
    pub mc_pass: bool,
}

impl ArmSummary {
    fn from_eval(label: &str, eval: &Evaluation) -> Self {
        Self {
            label: label.to_string(),
            sharpe: eval.metrics.sharpe,
            cagr: eval.metrics.cagr,
            p95_max_dd: eval.monte_carlo.aggregated.p95_max_dd,
            trade_count: eval.trade_count,
            mc_pass: eval.monte_carlo.passed(),
        }
    }
}

/// B − A.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbDeltas {
    pub p95_max_dd: f64,
    pub sharpe: f64,
    pub cagr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbResult {
    pub toggle: AbToggle,
    pub weights: HorizonWeights,
    pub a: ArmSummary,
    pub b: ArmSummary,
    pub deltas: AbDeltas,
    pub recommendation: Recommendation,
}

/// Map deltas onto one of the fixed recommendations.
pub fn recommend(deltas: &AbDeltas, thresholds: &AbThresholds) -> Recommendation {
    if deltas.p95_max_dd.abs() < thresholds.negligible_drawdown
        && deltas.sharpe.abs() < thresholds.negligible_sharpe
        && deltas.cagr.abs() < thresholds.negligible_cagr
    {
        return Recommendation::NoMaterialDifference;
    }
    let tail_improvement = -deltas.p95_max_dd;
    let sharpe_cost = -deltas.sharpe;
    if tail_improvement >= thresholds.min_tail_improvement {
        if sharpe_cost <= thresholds.max_sharpe_cost {
            Recommendation::Enable
        } else {
            Recommendation::TradeOff
        }
    } else if sharpe_cost < 0.0 && tail_improvement >= -thresholds.negligible_drawdown {
        // Better Sharpe without a worse tail, just not by the enable margin.
        Recommendation::TradeOff
    } else {
        Recommendation::Disable
    }
}

/// Run the full pipeline on both arms and compare.
pub fn ab_certify(
    bars: &[PriceBar],
    forecaster: &dyn Forecaster,
    base: &SimConfig,
    mc: &McConfig,
    toggle: AbToggle,
    thresholds: &AbThresholds,
) -> Result<AbResult, CandidateError> {
    let (config_a, config_b) = toggle.arms(base);
    compare(bars, forecaster, &config_a, &config_b, mc, toggle, thresholds)
}

/// Compare two explicit configs under the same weights and Monte Carlo setup.
pub fn compare(
    bars: &[PriceBar],
    forecaster: &dyn Forecaster,
    config_a: &SimConfig,
    config_b: &SimConfig,
    mc: &McConfig,
    toggle: AbToggle,
    thresholds: &AbThresholds,
) -> Result<AbResult, CandidateError> {
    let weights = config_a.horizon.weights;
    let (eval_a, eval_b) = rayon::join(
        || Evaluator::new(bars, forecaster, config_a, mc).evaluate(weights),
        || Evaluator::new(bars, forecaster, config_b, mc).evaluate(config_b.horizon.weights),
    );
    let (eval_a, eval_b) = (eval_a?, eval_b?);

    let a = ArmSummary::from_eval("A", &eval_a);
    let b = ArmSummary::from_eval("B", &eval_b);
    let deltas = AbDeltas {
        p95_max_dd: b.p95_max_dd - a.p95_max_dd,
        sharpe: b.sharpe - a.sharpe,
        cagr: b.cagr - a.cagr,
    };
    let recommendation = recommend(&deltas, thresholds);
    info!(
        ?toggle,
        d_p95_max_dd = deltas.p95_max_dd,
        d_sharpe = deltas.sharpe,
        d_cagr = deltas.cagr,
        ?recommendation,
        "a/b certification complete"
    );
    Ok(AbResult {
        toggle,
        weights,
        a,
        b,
        deltas,
        recommendation,
    })
}
