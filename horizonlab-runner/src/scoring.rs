//! Candidate scoring — composite objective and penalties.
//!
//! score = 1.0·p10Sharpe + 0.2·medianCAGR − 0.8·p95MaxDD
//!         − 0.3·dominancePenalty − 0.3·lowTradesPenalty
//!
//! Higher is better. Both penalties are linear and lie in [0, 1].

use std::cmp::Ordering;

use horizonlab_core::domain::HorizonWeights;
use serde::{Deserialize, Serialize};

use crate::evaluator::Evaluation;

/// Coefficients of the composite objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub p10_sharpe: f64,
    pub median_cagr: f64,
    pub p95_max_dd: f64,
    pub dominance: f64,
    pub low_trades: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            p10_sharpe: 1.0,
            median_cagr: 0.2,
            p95_max_dd: 0.8,
            dominance: 0.3,
            low_trades: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyConfig {
    /// Dominance penalty starts once the largest weight exceeds this.
    pub dominance_threshold: f64,
    /// Candidates with fewer closed trades are discarded outright.
    pub min_trades: usize,
    /// Low-trade penalty reaches zero at this trade count.
    pub target_trades: usize,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            dominance_threshold: 0.55,
            min_trades: 10,
            target_trades: 30,
        }
    }
}

/// Linear penalty in [0, 1]: 0 at the threshold, 1 when one horizon
/// carries all the weight.
pub fn dominance_penalty(weights: &HorizonWeights, threshold: f64) -> f64 {
    let excess = weights.max_weight() - threshold;
    if excess <= 0.0 || threshold >= 1.0 {
        return 0.0;
    }
    (excess / (1.0 - threshold)).min(1.0)
}

/// Linear penalty in [0, 1]: 1 with no trades, 0 at or above `target`.
pub fn low_trades_penalty(trades: usize, target: usize) -> f64 {
    if target == 0 || trades >= target {
        return 0.0;
    }
    (target - trades) as f64 / target as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStage {
    Coarse,
    Refine,
}

/// Each term of the objective before weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub p10_sharpe: f64,
    pub median_cagr: f64,
    pub p95_max_dd: f64,
    pub dominance_penalty: f64,
    pub low_trades_penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub weights: HorizonWeights,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub trade_count: usize,
    pub sim_sharpe: f64,
    pub mc_pass: bool,
    pub stage: SearchStage,
}

/// Why a candidate that evaluated cleanly was still not scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooFewTrades { trades: usize, min: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scorer {
    pub weights: ScoreWeights,
    pub penalties: PenaltyConfig,
}

impl Scorer {
    /// Hard trade-count gate, checked before the validator runs.
    pub fn admit(&self, trades: usize) -> Result<(), Rejection> {
        if trades < self.penalties.min_trades {
            return Err(Rejection::TooFewTrades {
                trades,
                min: self.penalties.min_trades,
            });
        }
        Ok(())
    }

    pub fn score(&self, eval: &Evaluation, stage: SearchStage) -> Result<CandidateScore, Rejection> {
        self.admit(eval.trade_count)?;
        let agg = &eval.monte_carlo.aggregated;
        let breakdown = ScoreBreakdown {
            p10_sharpe: agg.p10_sharpe,
            median_cagr: agg.median_cagr,
            p95_max_dd: agg.p95_max_dd,
            dominance_penalty: dominance_penalty(&eval.weights, self.penalties.dominance_threshold),
            low_trades_penalty: low_trades_penalty(eval.trade_count, self.penalties.target_trades),
        };
        let w = &self.weights;
        let score = w.p10_sharpe * breakdown.p10_sharpe + w.median_cagr * breakdown.median_cagr
            - w.p95_max_dd * breakdown.p95_max_dd
            - w.dominance * breakdown.dominance_penalty
            - w.low_trades * breakdown.low_trades_penalty;

        Ok(CandidateScore {
            weights: eval.weights,
            score,
            breakdown,
            trade_count: eval.trade_count,
            sim_sharpe: eval.metrics.sharpe,
            mc_pass: eval.monte_carlo.passed(),
            stage,
        })
    }
}

/// Best first; equal scores fall back to the weight key so the order never
/// depends on evaluation order.
pub fn rank_order(a: &CandidateScore, b: &CandidateScore) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.weights.key().cmp(&b.weights.key()))
}

pub fn rank(scores: &mut [CandidateScore]) {
    scores.sort_by(rank_order);
}
