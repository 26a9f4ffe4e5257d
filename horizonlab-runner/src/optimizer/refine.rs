//! Refine stage — bounded stochastic hill-climb from each top grid point.
//!
//! Each trial nudges one randomly chosen horizon weight by ±δ, renormalizes
//! (via `HorizonWeights::perturb`), and re-runs the full pipeline. A trial is
//! kept only if it strictly improves the score. A climb stops after
//! `patience` consecutive non-improving trials, after `max_iterations`
//! trials, or when the budget runs out.

use horizonlab_core::domain::Horizon;
use horizonlab_core::rng::RngHierarchy;
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{evaluate_candidate, BudgetTracker, Outcome};
use crate::evaluator::Evaluator;
use crate::grid::WeightConstraints;
use crate::scoring::{rank, CandidateScore, Scorer, SearchStage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    /// Perturbation size per trial.
    pub delta: f64,
    /// Consecutive non-improving trials before a climb stops.
    pub patience: usize,
    /// Hard cap on trials per climb.
    pub max_iterations: usize,
    /// Number of coarse winners to climb from.
    pub top_k: usize,
    /// Fixed seed for reproducible runs. `None` draws one (and logs it).
    pub seed: Option<u64>,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            delta: 0.03,
            patience: 20,
            max_iterations: 200,
            top_k: 5,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Patience,
    MaxIterations,
    Budget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimbSummary {
    pub start_score: f64,
    pub final_score: f64,
    pub trials: usize,
    pub evaluations: usize,
    pub accepted: usize,
    pub stop: StopReason,
}

#[derive(Debug, Clone, Default)]
pub struct RefineOutcome {
    /// Final point of each climb, best first.
    pub finals: Vec<CandidateScore>,
    /// One entry per climb, in seed order.
    pub climbs: Vec<ClimbSummary>,
    pub failed: usize,
    pub rejected: usize,
    pub seed: u64,
}

struct Climb {
    best: CandidateScore,
    summary: ClimbSummary,
    failed: usize,
    rejected: usize,
}

/// Climb from each of `seeds` in parallel.
///
/// When the budget caps evaluations, the remaining allowance is split evenly
/// across climbs up front, so each climb's path is independent of how the
/// others are scheduled.
pub fn refine(
    evaluator: &Evaluator<'_>,
    scorer: &Scorer,
    constraints: &WeightConstraints,
    seeds: &[CandidateScore],
    config: &RefineConfig,
    tracker: &BudgetTracker<'_>,
) -> RefineOutcome {
    let seed = config.seed.unwrap_or_else(rand::random);
    info!(seed, climbs = seeds.len(), "refine stage starting");

    let rng = RngHierarchy::new(seed);
    let allowances = split_allowance(tracker.remaining(), seeds.len());

    let climbs: Vec<Climb> = seeds
        .par_iter()
        .zip(allowances.par_iter())
        .enumerate()
        .map(|(i, (start, &allowance))| {
            let mut climb_rng = rng.rng_for("refine", i as u64);
            climb(
                evaluator,
                scorer,
                constraints,
                start,
                config,
                tracker,
                allowance,
                &mut climb_rng,
            )
        })
        .collect();

    let mut out = RefineOutcome {
        seed,
        ..RefineOutcome::default()
    };
    for c in climbs {
        out.failed += c.failed;
        out.rejected += c.rejected;
        out.climbs.push(c.summary);
        out.finals.push(c.best);
    }
    rank(&mut out.finals);
    out
}

/// Per-climb evaluation allowance; the remainder goes to the first climbs.
fn split_allowance(remaining: Option<usize>, climbs: usize) -> Vec<Option<usize>> {
    match remaining {
        None => vec![None; climbs],
        Some(total) if climbs > 0 => {
            let base = total / climbs;
            let extra = total % climbs;
            (0..climbs).map(|i| Some(base + usize::from(i < extra))).collect()
        }
        Some(_) => Vec::new(),
    }
}

#[allow(clippy::too_many_arguments)]
fn climb(
    evaluator: &Evaluator<'_>,
    scorer: &Scorer,
    constraints: &WeightConstraints,
    start: &CandidateScore,
    config: &RefineConfig,
    tracker: &BudgetTracker<'_>,
    allowance: Option<usize>,
    rng: &mut StdRng,
) -> Climb {
    let mut current = start.clone();
    let mut stale = 0usize;
    let mut trials = 0usize;
    let mut evaluations = 0usize;
    let mut accepted = 0usize;
    let mut failed = 0usize;
    let mut rejected = 0usize;
    let mut stop = StopReason::MaxIterations;

    while trials < config.max_iterations {
        if stale >= config.patience {
            stop = StopReason::Patience;
            break;
        }
        if allowance.is_some_and(|a| evaluations >= a) || tracker.interrupted() {
            tracker.mark_exhausted();
            stop = StopReason::Budget;
            break;
        }
        trials += 1;

        let horizon = Horizon::ALL[rng.gen_range(0..Horizon::ALL.len())];
        let delta = if rng.gen_bool(0.5) {
            config.delta
        } else {
            -config.delta
        };
        let trial = current.weights.perturb(horizon, delta);
        if trial.key() == current.weights.key() || !constraints.admits(&trial) {
            stale += 1;
            continue;
        }

        evaluations += 1;
        tracker.charge();
        match evaluate_candidate(evaluator, scorer, trial, SearchStage::Refine) {
            Outcome::Scored(score) if score.score > current.score => {
                current = score;
                accepted += 1;
                stale = 0;
            }
            Outcome::Scored(_) | Outcome::Skipped => stale += 1,
            Outcome::Rejected(..) => {
                rejected += 1;
                stale += 1;
            }
            Outcome::Failed(..) => {
                failed += 1;
                stale += 1;
            }
        }
    }

    debug!(
        start = start.score,
        end = current.score,
        trials,
        accepted,
        ?stop,
        "climb finished"
    );
    Climb {
        summary: ClimbSummary {
            start_score: start.score,
            final_score: current.score,
            trials,
            evaluations,
            accepted,
            stop,
        },
        best: current,
        failed,
        rejected,
    }
}
