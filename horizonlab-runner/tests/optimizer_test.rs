//! Optimizer: grid contents, failure isolation, budgets and determinism.

mod common;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use common::{bars, quick_mc, quick_optimize, sim_config, Cycle};
use horizonlab_runner::evaluator::{CandidateError, Evaluator};
use horizonlab_runner::grid::{self, GridConfig, WeightConstraints};
use horizonlab_runner::optimizer::{optimize, SearchBudget};
use horizonlab_runner::scoring::SearchStage;

#[test]
fn balanced_vector_is_on_the_constrained_grid() {
    let config = GridConfig {
        step: 0.10,
        floor: 0.05,
        constraints: WeightConstraints {
            max_w7: 0.35,
            max_w60: 0.45,
            min_w14_w30: 0.35,
        },
    };
    let kept = grid::candidates(&config).unwrap();
    assert!(kept.iter().any(|w| {
        let a = w.as_array();
        (a[0] - 0.20).abs() < 1e-9
            && (a[1] - 0.30).abs() < 1e-9
            && (a[2] - 0.30).abs() < 1e-9
            && (a[3] - 0.20).abs() < 1e-9
    }));
}

#[test]
fn full_search_scores_and_ranks_candidates() {
    let bars = bars();
    let forecaster = Cycle::new();
    let sim = sim_config();
    let mc = quick_mc();
    let evaluator = Evaluator::new(&bars, &forecaster, &sim, &mc);
    let config = quick_optimize();

    let report = optimize(&evaluator, &config, &SearchBudget::unlimited()).unwrap();
    let grid_size = grid::candidates(&config.grid).unwrap().len();

    assert_eq!(report.grid_size, grid_size);
    assert_eq!(report.failed, 0);
    assert!(!report.budget_exhausted);
    assert_eq!(report.refine_seed, 99);
    assert!(report.evaluated >= grid_size);
    assert!(report.coarse.len() + report.rejected >= grid_size);

    for pair in report.coarse.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(report.coarse.iter().all(|c| c.stage == SearchStage::Coarse));
    assert!(report.coarse.iter().all(|c| config.grid.constraints.admits(&c.weights)));

    let best = report.best.as_ref().expect("at least one candidate scores");
    assert!(report.coarse.iter().all(|c| c.score <= best.score));
    assert!(report.refined.iter().all(|c| c.score <= best.score));
    // A climb never ends below the grid point it started from.
    for climb in &report.climbs {
        assert!(climb.final_score >= climb.start_score);
        assert!(climb.trials <= config.refine.max_iterations);
    }
}

#[test]
fn failing_candidates_are_dropped_not_fatal() {
    let bars = bars();
    let forecaster = Cycle::panicking_above(0.25);
    let sim = sim_config();
    let mc = quick_mc();
    let evaluator = Evaluator::new(&bars, &forecaster, &sim, &mc);
    let config = quick_optimize();

    let heavy_w7 = grid::candidates(&config.grid)
        .unwrap()
        .iter()
        .filter(|w| w.w7() > 0.25)
        .count();
    assert!(heavy_w7 > 0);

    let report = optimize(&evaluator, &config, &SearchBudget::unlimited()).unwrap();
    assert!(report.failed >= heavy_w7);
    assert!(report.coarse.iter().all(|c| c.weights.w7() <= 0.25));
    assert!(report.refined.iter().all(|c| c.weights.w7() <= 0.25));
    assert!(report.best.is_some());
}

#[test]
fn evaluator_reports_panics_as_candidate_errors() {
    let bars = bars();
    let forecaster = Cycle::panicking_above(0.25);
    let sim = sim_config();
    let mc = quick_mc();
    let evaluator = Evaluator::new(&bars, &forecaster, &sim, &mc);
    let heavy = horizonlab_core::domain::HorizonWeights::new(0.3, 0.3, 0.2, 0.2).unwrap();
    match evaluator.evaluate(heavy) {
        Err(CandidateError::Panicked(msg)) => assert!(msg.contains("rejects w7")),
        other => panic!("expected a panic to be captured, got {other:?}"),
    }
}

#[test]
fn evaluation_cap_is_honored() {
    let bars = bars();
    let forecaster = Cycle::new();
    let sim = sim_config();
    let mc = quick_mc();
    let evaluator = Evaluator::new(&bars, &forecaster, &sim, &mc);
    let config = quick_optimize();

    let report = optimize(&evaluator, &config, &SearchBudget::with_max_evaluations(5)).unwrap();
    assert!(report.grid_size > 5);
    assert!(report.evaluated <= 5);
    assert!(report.coarse.len() <= 5);
    assert!(report.budget_exhausted);
}

#[test]
fn cancelled_search_returns_empty_partial_report() {
    let bars = bars();
    let forecaster = Cycle::new();
    let sim = sim_config();
    let mc = quick_mc();
    let evaluator = Evaluator::new(&bars, &forecaster, &sim, &mc);
    let budget = SearchBudget {
        cancel: Some(Arc::new(AtomicBool::new(true))),
        ..SearchBudget::default()
    };

    let report = optimize(&evaluator, &quick_optimize(), &budget).unwrap();
    assert_eq!(report.evaluated, 0);
    assert!(report.coarse.is_empty());
    assert!(report.best.is_none());
    assert!(report.budget_exhausted);
}

#[test]
fn same_seed_same_report() {
    let bars = bars();
    let forecaster = Cycle::new();
    let sim = sim_config();
    let mc = quick_mc();
    let evaluator = Evaluator::new(&bars, &forecaster, &sim, &mc);
    let config = quick_optimize();

    let a = optimize(&evaluator, &config, &SearchBudget::unlimited()).unwrap();
    let b = rayon::ThreadPoolBuilder::new()
        .num_threads(2)
        .build()
        .unwrap()
        .install(|| optimize(&evaluator, &config, &SearchBudget::unlimited()).unwrap());
    assert_eq!(a, b);
}
