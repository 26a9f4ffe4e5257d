//! Coarse stage — evaluate every constrained grid vector in parallel.

use horizonlab_core::domain::HorizonWeights;
use rayon::prelude::*;
use tracing::{debug, info};

use super::{evaluate_candidate, BudgetTracker, Outcome};
use crate::evaluator::Evaluator;
use crate::scoring::{rank, CandidateScore, Scorer, SearchStage};

#[derive(Debug, Clone, Default)]
pub struct CoarseOutcome {
    /// Scored candidates, best first.
    pub scores: Vec<CandidateScore>,
    pub failed: usize,
    pub rejected: usize,
    pub skipped: usize,
}

/// Evaluate `candidates` on the rayon pool.
///
/// An evaluation cap truncates the candidate list up front (in grid order)
/// so the evaluated set never depends on thread scheduling. Cancellation and
/// the time limit are checked before each evaluation.
pub fn coarse_search(
    evaluator: &Evaluator<'_>,
    scorer: &Scorer,
    candidates: &[HorizonWeights],
    tracker: &BudgetTracker<'_>,
) -> CoarseOutcome {
    let allowed = match tracker.remaining() {
        Some(r) if r < candidates.len() => {
            info!(
                grid = candidates.len(),
                allowed = r,
                "evaluation budget smaller than grid"
            );
            tracker.mark_exhausted();
            r
        }
        _ => candidates.len(),
    };

    let outcomes: Vec<Outcome> = candidates[..allowed]
        .par_iter()
        .map(|&weights| {
            if tracker.interrupted() {
                return Outcome::Skipped;
            }
            tracker.charge();
            evaluate_candidate(evaluator, scorer, weights, SearchStage::Coarse)
        })
        .collect();

    let mut out = CoarseOutcome {
        skipped: candidates.len() - allowed,
        ..CoarseOutcome::default()
    };
    for outcome in outcomes {
        match outcome {
            Outcome::Scored(score) => out.scores.push(score),
            Outcome::Rejected(weights, reason) => {
                debug!(weights = %weights, ?reason, "candidate rejected");
                out.rejected += 1;
            }
            Outcome::Failed(..) => out.failed += 1,
            Outcome::Skipped => out.skipped += 1,
        }
    }
    rank(&mut out.scores);
    debug!(
        scored = out.scores.len(),
        failed = out.failed,
        rejected = out.rejected,
        skipped = out.skipped,
        "coarse search complete"
    );
    out
}
