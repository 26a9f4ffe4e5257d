//! Horizon-weight optimizer — coarse grid search followed by a bounded
//! stochastic hill-climb around the best grid points.
//!
//! Both stages evaluate candidates through the `Evaluator` pipeline on the
//! rayon pool. A failing candidate is logged, counted and dropped; it never
//! aborts the search. A `SearchBudget` is checked before every evaluation,
//! and whatever was finished when it runs out is still reported.

pub mod coarse;
pub mod refine;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use horizonlab_core::domain::HorizonWeights;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::evaluator::{CandidateError, Evaluation, Evaluator};
use crate::grid::{self, GridConfig, GridError};
use crate::scoring::{rank, CandidateScore, Rejection, Scorer, SearchStage};

pub use coarse::{coarse_search, CoarseOutcome};
pub use refine::{refine, ClimbSummary, RefineConfig, RefineOutcome, StopReason};

// ─── Budget ──────────────────────────────────────────────────────────

/// Caller-supplied limits on a search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchBudget {
    /// Total candidate evaluations across both stages.
    pub max_evaluations: Option<usize>,
    /// Wall-clock limit in seconds.
    pub max_seconds: Option<f64>,
    /// Cooperative stop flag, checked before each evaluation.
    #[serde(skip)]
    pub cancel: Option<Arc<AtomicBool>>,
}

impl SearchBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_evaluations(n: usize) -> Self {
        Self {
            max_evaluations: Some(n),
            ..Self::default()
        }
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_seconds
            .map(|s| Duration::from_secs_f64(if s.is_finite() { s.max(0.0) } else { 0.0 }))
    }
}

/// Live accounting against a `SearchBudget` for one search.
#[derive(Debug)]
pub struct BudgetTracker<'a> {
    budget: &'a SearchBudget,
    started: Instant,
    spent: AtomicUsize,
    exhausted: AtomicBool,
}

impl<'a> BudgetTracker<'a> {
    pub fn new(budget: &'a SearchBudget) -> Self {
        Self {
            budget,
            started: Instant::now(),
            spent: AtomicUsize::new(0),
            exhausted: AtomicBool::new(false),
        }
    }

    /// Cancelled or out of time. Marks the budget exhausted when true.
    pub fn interrupted(&self) -> bool {
        let cancelled = self
            .budget
            .cancel
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed));
        let timed_out = self
            .budget
            .max_duration()
            .is_some_and(|d| self.started.elapsed() >= d);
        if cancelled || timed_out {
            self.mark_exhausted();
        }
        cancelled || timed_out
    }

    /// Evaluations still allowed, or `None` when uncapped.
    pub fn remaining(&self) -> Option<usize> {
        self.budget
            .max_evaluations
            .map(|max| max.saturating_sub(self.spent.load(Ordering::Relaxed)))
    }

    pub fn charge(&self) {
        self.spent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn spent(&self) -> usize {
        self.spent.load(Ordering::Relaxed)
    }

    pub fn mark_exhausted(&self) {
        self.exhausted.store(true, Ordering::Relaxed);
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

// ─── Single-candidate step ───────────────────────────────────────────

/// What happened to one candidate.
#[derive(Debug, Clone)]
pub enum Outcome {
    Scored(CandidateScore),
    Rejected(HorizonWeights, Rejection),
    Failed(HorizonWeights, CandidateError),
    /// Not evaluated because the budget ran out first.
    Skipped,
}

/// Simulate, gate on trade count, validate, score.
pub fn evaluate_candidate(
    evaluator: &Evaluator<'_>,
    scorer: &Scorer,
    weights: HorizonWeights,
    stage: SearchStage,
) -> Outcome {
    let result = match evaluator.run(weights) {
        Ok(r) => r,
        Err(e) => {
            warn!(weights = %weights, error = %e, "dropping candidate");
            return Outcome::Failed(weights, e);
        }
    };
    if let Err(rejection) = scorer.admit(result.trades.len()) {
        return Outcome::Rejected(weights, rejection);
    }
    let monte_carlo = match evaluator.validate(&result) {
        Ok(mc) => mc,
        Err(e) => {
            warn!(weights = %weights, error = %e, "dropping candidate");
            return Outcome::Failed(weights, e);
        }
    };
    let eval = Evaluation {
        weights,
        trade_count: result.trades.len(),
        metrics: result.metrics,
        monte_carlo,
    };
    match scorer.score(&eval, stage) {
        Ok(score) => Outcome::Scored(score),
        Err(rejection) => Outcome::Rejected(weights, rejection),
    }
}

// ─── Full search ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeConfig {
    pub grid: GridConfig,
    pub scorer: Scorer,
    pub refine: RefineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeReport {
    /// Best candidate found by either stage.
    pub best: Option<CandidateScore>,
    /// Every scored grid candidate, best first.
    pub coarse: Vec<CandidateScore>,
    /// Final point of each hill-climb, best first.
    pub refined: Vec<CandidateScore>,
    pub climbs: Vec<ClimbSummary>,
    pub grid_size: usize,
    pub evaluated: usize,
    pub failed: usize,
    pub rejected: usize,
    pub budget_exhausted: bool,
    pub refine_seed: u64,
}

/// Run the coarse grid and the refine stage.
pub fn optimize(
    evaluator: &Evaluator<'_>,
    config: &OptimizeConfig,
    budget: &SearchBudget,
) -> Result<OptimizeReport, GridError> {
    let candidates = grid::candidates(&config.grid)?;
    let tracker = BudgetTracker::new(budget);
    info!(candidates = candidates.len(), "coarse search starting");

    let coarse = coarse_search(evaluator, &config.scorer, &candidates, &tracker);
    let seeds: Vec<CandidateScore> = coarse
        .scores
        .iter()
        .take(config.refine.top_k)
        .cloned()
        .collect();

    let refined = refine(
        evaluator,
        &config.scorer,
        &config.grid.constraints,
        &seeds,
        &config.refine,
        &tracker,
    );

    let mut best_pool: Vec<CandidateScore> = coarse
        .scores
        .iter()
        .chain(refined.finals.iter())
        .cloned()
        .collect();
    rank(&mut best_pool);

    if tracker.exhausted() {
        info!(evaluated = tracker.spent(), "search budget exhausted");
    }
    let report = OptimizeReport {
        best: best_pool.into_iter().next(),
        coarse: coarse.scores,
        refined: refined.finals,
        climbs: refined.climbs,
        grid_size: candidates.len(),
        evaluated: tracker.spent(),
        failed: coarse.failed + refined.failed,
        rejected: coarse.rejected + refined.rejected,
        budget_exhausted: tracker.exhausted(),
        refine_seed: refined.seed,
    };
    if let Some(best) = &report.best {
        info!(
            weights = %best.weights,
            score = best.score,
            evaluated = report.evaluated,
            failed = report.failed,
            elapsed_ms = tracker.elapsed().as_millis() as u64,
            "optimization complete"
        );
    } else {
        warn!(evaluated = report.evaluated, "optimization found no scorable candidate");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_budget_never_interrupts() {
        let budget = SearchBudget::unlimited();
        let tracker = BudgetTracker::new(&budget);
        assert!(!tracker.interrupted());
        assert_eq!(tracker.remaining(), None);
        assert!(!tracker.exhausted());
    }

    #[test]
    fn evaluation_cap_counts_down() {
        let budget = SearchBudget::with_max_evaluations(3);
        let tracker = BudgetTracker::new(&budget);
        tracker.charge();
        tracker.charge();
        assert_eq!(tracker.remaining(), Some(1));
        tracker.charge();
        tracker.charge();
        assert_eq!(tracker.remaining(), Some(0));
    }

    #[test]
    fn cancel_flag_interrupts_and_marks_exhausted() {
        let flag = Arc::new(AtomicBool::new(false));
        let budget = SearchBudget {
            cancel: Some(flag.clone()),
            ..SearchBudget::default()
        };
        let tracker = BudgetTracker::new(&budget);
        assert!(!tracker.interrupted());
        flag.store(true, Ordering::Relaxed);
        assert!(tracker.interrupted());
        assert!(tracker.exhausted());
    }

    #[test]
    fn zero_duration_times_out() {
        let budget = SearchBudget {
            max_seconds: Some(0.0),
            ..SearchBudget::default()
        };
        assert!(BudgetTracker::new(&budget).interrupted());
    }
}
