//! Rolling walk-forward validation — train/test splits stepped across history.
//!
//! Splits the bar series into expanding train windows, each followed by a
//! fixed-size test window. The train window doubles as the forecaster's
//! warm-up for the test run and is also scored in-sample, so the summary can
//! report a degradation ratio (mean OOS Sharpe / mean IS Sharpe) next to the
//! gate checks.
//!
//! The test run always receives bars only up to the end of its test window;
//! nothing after it can reach the forecaster.

use horizonlab_core::domain::PriceBar;
use horizonlab_core::engine::{simulate, SimConfig, SimError};
use horizonlab_core::metrics::mean;
use horizonlab_core::oracle::Forecaster;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ─── Configuration ───────────────────────────────────────────────────

/// Gate criteria applied to the split summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingGates {
    pub min_mean_sharpe: f64,
    pub min_worst_sharpe: f64,
    pub max_mean_drawdown: f64,
    /// Fraction of splits that must pass individually.
    pub min_pass_rate: f64,
}

impl Default for RollingGates {
    fn default() -> Self {
        Self {
            min_mean_sharpe: 0.3,
            min_worst_sharpe: -0.5,
            max_mean_drawdown: 0.25,
            min_pass_rate: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingConfig {
    /// Number of train/test splits (default 4).
    pub n_splits: usize,
    /// Minimum total bars required (default 756 = 3 years of daily bars).
    pub min_total_bars: usize,
    /// Minimum train bars for the first split (default 252).
    pub min_train_bars: usize,
    /// Minimum test bars per split (default 126).
    pub min_test_bars: usize,
    pub gates: RollingGates,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            n_splits: 4,
            min_total_bars: 756,
            min_train_bars: 252,
            min_test_bars: 126,
            gates: RollingGates::default(),
        }
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Bar index ranges of one split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSpec {
    pub index: usize,
    /// Train start bar index (inclusive).
    pub train_start: usize,
    /// Train end bar index (exclusive).
    pub train_end: usize,
    /// Test start bar index (inclusive).
    pub test_start: usize,
    /// Test end bar index (exclusive).
    pub test_end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitResult {
    pub index: usize,
    pub train_sharpe: f64,
    pub test_sharpe: f64,
    pub test_max_drawdown: f64,
    pub test_cagr: f64,
    pub train_trades: usize,
    pub test_trades: usize,
    /// Test Sharpe positive and test drawdown within the gate cap.
    pub passed: bool,
}

/// How the degradation ratio was computed (or why it wasn't).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradationFlag {
    /// IS Sharpe >= 0.1, ratio computed normally.
    Normal,
    /// IS Sharpe < 0.1, using difference metric (OOS - IS) instead.
    LowIsSharpe,
    /// IS Sharpe is negative, ratio skipped entirely.
    NegativeIsSharpe,
    /// IS Sharpe positive (>= 0.1) but OOS Sharpe negative: clamped to 0.0.
    FailedOos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingSummary {
    pub splits: Vec<SplitResult>,
    pub mean_sharpe: f64,
    pub worst_sharpe: f64,
    pub mean_drawdown: f64,
    pub pass_rate: f64,
    pub mean_train_sharpe: f64,
    pub degradation_ratio: Option<f64>,
    pub degradation_flag: DegradationFlag,
    /// Names of the gates that did not hold.
    pub failed_gates: Vec<String>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RollingError {
    #[error("insufficient data: {total_bars} bars < minimum {min_bars}")]
    InsufficientData { total_bars: usize, min_bars: usize },
    #[error("split creation failed: cannot fit {n_splits} splits in {total_bars} bars")]
    SplitCreationFailed { n_splits: usize, total_bars: usize },
    #[error("simulation failed on split {split}: {source}")]
    SimFailed {
        split: usize,
        #[source]
        source: SimError,
    },
}

// ─── Collaborator seam ───────────────────────────────────────────────

/// Black-box rolling validation used by certification.
pub trait RollingValidator: Send + Sync {
    fn validate(
        &self,
        bars: &[PriceBar],
        sim: &SimConfig,
        forecaster: &dyn Forecaster,
    ) -> Result<RollingSummary, RollingError>;
}

/// Expanding-train walk-forward splits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardSplits {
    pub config: RollingConfig,
}

impl WalkForwardSplits {
    pub fn new(config: RollingConfig) -> Self {
        Self { config }
    }
}

impl RollingValidator for WalkForwardSplits {
    fn validate(
        &self,
        bars: &[PriceBar],
        sim: &SimConfig,
        forecaster: &dyn Forecaster,
    ) -> Result<RollingSummary, RollingError> {
        let splits = create_splits(bars.len(), &self.config)?;
        let results = splits
            .par_iter()
            .map(|split| run_split(bars, split, sim, forecaster, &self.config.gates))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summarize(results, &self.config.gates))
    }
}

// ─── Split creation ──────────────────────────────────────────────────

/// Create expanding-train split specifications.
///
/// - Split 0: train = [0 .. min_train], test = next `test_size` bars
/// - Split 1: train = [0 .. min_train + test_size], test = next chunk
/// - etc.
///
/// Test windows are contiguous and never overlap.
pub fn create_splits(total_bars: usize, config: &RollingConfig) -> Result<Vec<SplitSpec>, RollingError> {
    if total_bars < config.min_total_bars {
        return Err(RollingError::InsufficientData {
            total_bars,
            min_bars: config.min_total_bars,
        });
    }
    let n = config.n_splits.max(1);
    let test_size = total_bars.saturating_sub(config.min_train_bars) / n;
    if test_size < config.min_test_bars || test_size == 0 {
        return Err(RollingError::SplitCreationFailed {
            n_splits: n,
            total_bars,
        });
    }

    let splits: Vec<SplitSpec> = (0..n)
        .map(|i| {
            let train_end = config.min_train_bars + i * test_size;
            SplitSpec {
                index: i,
                train_start: 0,
                train_end,
                test_start: train_end,
                test_end: train_end + test_size,
            }
        })
        .take_while(|s| s.test_end <= total_bars)
        .collect();

    if splits.is_empty() {
        return Err(RollingError::SplitCreationFailed {
            n_splits: n,
            total_bars,
        });
    }
    Ok(splits)
}

fn run_split(
    bars: &[PriceBar],
    split: &SplitSpec,
    sim: &SimConfig,
    forecaster: &dyn Forecaster,
    gates: &RollingGates,
) -> Result<SplitResult, RollingError> {
    let fail = |source| RollingError::SimFailed {
        split: split.index,
        source,
    };

    let train_bars = &bars[split.train_start..split.train_end];
    let mut train_cfg = sim.clone();
    train_cfg.start = None;
    train_cfg.end = None;
    let train = simulate(train_bars, &train_cfg, forecaster).map_err(fail)?;

    // Test run sees the train window as lookback and stops at the test end.
    let test_bars = &bars[split.train_start..split.test_end];
    let mut test_cfg = sim.clone();
    test_cfg.start = Some(bars[split.test_start].date());
    test_cfg.end = Some(bars[split.test_end - 1].date());
    let test = simulate(test_bars, &test_cfg, forecaster).map_err(fail)?;

    let passed = test.metrics.sharpe > 0.0 && test.metrics.max_drawdown <= gates.max_mean_drawdown;
    debug!(
        split = split.index,
        train_sharpe = train.metrics.sharpe,
        test_sharpe = test.metrics.sharpe,
        passed,
        "split evaluated"
    );
    Ok(SplitResult {
        index: split.index,
        train_sharpe: train.metrics.sharpe,
        test_sharpe: test.metrics.sharpe,
        test_max_drawdown: test.metrics.max_drawdown,
        test_cagr: test.metrics.cagr,
        train_trades: train.trades.len(),
        test_trades: test.trades.len(),
        passed,
    })
}

/// Aggregate split results and apply the gates.
pub fn summarize(splits: Vec<SplitResult>, gates: &RollingGates) -> RollingSummary {
    let test_sharpes: Vec<f64> = splits.iter().map(|s| s.test_sharpe).collect();
    let train_sharpes: Vec<f64> = splits.iter().map(|s| s.train_sharpe).collect();
    let drawdowns: Vec<f64> = splits.iter().map(|s| s.test_max_drawdown).collect();

    let mean_sharpe = mean(&test_sharpes);
    let worst_sharpe = test_sharpes.iter().copied().fold(f64::INFINITY, f64::min);
    let worst_sharpe = if worst_sharpe.is_finite() { worst_sharpe } else { 0.0 };
    let mean_drawdown = mean(&drawdowns);
    let pass_rate = if splits.is_empty() {
        0.0
    } else {
        splits.iter().filter(|s| s.passed).count() as f64 / splits.len() as f64
    };
    let mean_train_sharpe = mean(&train_sharpes);
    let (degradation_ratio, degradation_flag) = compute_degradation_ratio(mean_train_sharpe, mean_sharpe);

    let mut failed_gates = Vec::new();
    if splits.is_empty() {
        failed_gates.push("no_splits".to_string());
    }
    if mean_sharpe < gates.min_mean_sharpe {
        failed_gates.push("min_mean_sharpe".to_string());
    }
    if worst_sharpe < gates.min_worst_sharpe {
        failed_gates.push("min_worst_sharpe".to_string());
    }
    if mean_drawdown > gates.max_mean_drawdown {
        failed_gates.push("max_mean_drawdown".to_string());
    }
    if pass_rate < gates.min_pass_rate {
        failed_gates.push("min_pass_rate".to_string());
    }

    RollingSummary {
        splits,
        mean_sharpe,
        worst_sharpe,
        mean_drawdown,
        pass_rate,
        mean_train_sharpe,
        degradation_ratio,
        degradation_flag,
        passed: failed_gates.is_empty(),
        failed_gates,
    }
}

/// Degradation ratio with edge-case handling.
///
/// - IS >= 0.1: ratio = OOS / IS (Normal)
/// - IS < 0.1 and >= 0: difference = OOS - IS (LowIsSharpe)
/// - IS < 0: ratio skipped (NegativeIsSharpe)
/// - IS >= 0.1 but OOS < 0: clamped to 0.0 (FailedOos)
pub fn compute_degradation_ratio(mean_is_sharpe: f64, mean_oos_sharpe: f64) -> (Option<f64>, DegradationFlag) {
    if mean_is_sharpe < 0.0 {
        (None, DegradationFlag::NegativeIsSharpe)
    } else if mean_is_sharpe < 0.1 {
        (Some(mean_oos_sharpe - mean_is_sharpe), DegradationFlag::LowIsSharpe)
    } else if mean_oos_sharpe < 0.0 {
        (Some(0.0), DegradationFlag::FailedOos)
    } else {
        (Some(mean_oos_sharpe / mean_is_sharpe), DegradationFlag::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(index: usize, test_sharpe: f64, dd: f64, passed: bool) -> SplitResult {
        SplitResult {
            index,
            train_sharpe: 1.0,
            test_sharpe,
            test_max_drawdown: dd,
            test_cagr: 0.05,
            train_trades: 20,
            test_trades: 8,
            passed,
        }
    }

    // ─── Split creation ─────────────────────────────────────────

    #[test]
    fn splits_at_minimum_data() {
        let config = RollingConfig::default();
        let splits = create_splits(756, &config).unwrap();
        // (756 - 252) / 4 = 126 bars per test window.
        assert_eq!(splits.len(), 4);
        assert_eq!(splits[0].train_end, 252);
        assert_eq!(splits[0].test_start, 252);
        assert_eq!(splits[0].test_end, 378);
        assert_eq!(splits[3].test_end, 756);
    }

    #[test]
    fn train_window_expands_and_tests_are_contiguous() {
        let splits = create_splits(1200, &RollingConfig::default()).unwrap();
        for pair in splits.windows(2) {
            assert!(pair[1].train_end > pair[0].train_end);
            assert_eq!(pair[1].test_start, pair[0].test_end);
            assert_eq!(pair[1].train_start, 0);
        }
    }

    #[test]
    fn insufficient_total_bars() {
        let err = create_splits(500, &RollingConfig::default()).unwrap_err();
        assert_eq!(
            err,
            RollingError::InsufficientData {
                total_bars: 500,
                min_bars: 756
            }
        );
    }

    #[test]
    fn too_many_splits_for_data() {
        let config = RollingConfig {
            n_splits: 20,
            min_train_bars: 700,
            ..RollingConfig::default()
        };
        assert!(matches!(
            create_splits(756, &config),
            Err(RollingError::SplitCreationFailed { .. })
        ));
    }

    // ─── Summary and gates ──────────────────────────────────────

    #[test]
    fn healthy_splits_pass_all_gates() {
        let splits = vec![
            split(0, 0.8, 0.10, true),
            split(1, 0.6, 0.12, true),
            split(2, 0.2, 0.15, true),
            split(3, 0.9, 0.08, true),
        ];
        let summary = summarize(splits, &RollingGates::default());
        assert!(summary.passed, "{:?}", summary.failed_gates);
        assert!((summary.mean_sharpe - 0.625).abs() < 1e-12);
        assert_eq!(summary.worst_sharpe, 0.2);
        assert_eq!(summary.pass_rate, 1.0);
        assert_eq!(summary.degradation_flag, DegradationFlag::Normal);
    }

    #[test]
    fn one_bad_split_fails_worst_sharpe_gate() {
        let splits = vec![
            split(0, 1.5, 0.10, true),
            split(1, 1.2, 0.10, true),
            split(2, -0.9, 0.20, false),
        ];
        let summary = summarize(splits, &RollingGates::default());
        assert!(!summary.passed);
        assert!(summary.failed_gates.contains(&"min_worst_sharpe".to_string()));
        assert!(!summary.failed_gates.contains(&"min_mean_sharpe".to_string()));
    }

    #[test]
    fn low_pass_rate_fails() {
        let splits = vec![
            split(0, 0.8, 0.10, true),
            split(1, 0.5, 0.10, false),
            split(2, 0.5, 0.10, false),
        ];
        let summary = summarize(splits, &RollingGates::default());
        assert!(summary.failed_gates.contains(&"min_pass_rate".to_string()));
        assert!(!summary.passed);
    }

    #[test]
    fn empty_summary_never_passes() {
        let summary = summarize(Vec::new(), &RollingGates::default());
        assert!(!summary.passed);
        assert_eq!(summary.pass_rate, 0.0);
    }

    // ─── Degradation ratio ──────────────────────────────────────

    #[test]
    fn degradation_normal() {
        let (ratio, flag) = compute_degradation_ratio(1.0, 0.5);
        assert_eq!(flag, DegradationFlag::Normal);
        assert!((ratio.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn degradation_edge_cases() {
        assert_eq!(compute_degradation_ratio(-0.2, 0.5), (None, DegradationFlag::NegativeIsSharpe));
        let (diff, flag) = compute_degradation_ratio(0.05, 0.15);
        assert_eq!(flag, DegradationFlag::LowIsSharpe);
        assert!((diff.unwrap() - 0.10).abs() < 1e-12);
        assert_eq!(compute_degradation_ratio(0.8, -0.3), (Some(0.0), DegradationFlag::FailedOos));
    }
}
