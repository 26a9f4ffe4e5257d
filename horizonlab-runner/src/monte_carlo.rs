//! Monte Carlo block-bootstrap validator over a closed trade ledger.
//!
//! Resamples the ledger in contiguous blocks of `b` trades (with replacement,
//! no wrap-around) so local serial correlation between neighbouring trades
//! survives, then replays each resampled path through a pure compounding
//! pass. Paths are aggregated into tail percentiles and checked against the
//! acceptance thresholds.
//!
//! Key design choices:
//! - Every path has exactly as many trades as the source ledger.
//! - Each (block size, iteration) pair draws from its own `RngHierarchy`
//!   stream, so results do not depend on the rayon thread count.
//! - An empty ledger yields `MonteCarloResult::empty()`, never an error.

use horizonlab_core::domain::SimTrade;
use horizonlab_core::metrics::{cagr, growth, max_drawdown, percentile_sorted, sharpe, sorted};
use horizonlab_core::rng::RngHierarchy;
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Drawdown reported when there is nothing to validate.
pub const WORST_DRAWDOWN: f64 = 1.0;
/// Sharpe reported when there is nothing to validate.
pub const WORST_SHARPE: f64 = -999.0;
/// CAGR reported when there is nothing to validate.
pub const WORST_CAGR: f64 = -1.0;

// ─── Configuration ───────────────────────────────────────────────────

/// Acceptance thresholds applied to the aggregated statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McThresholds {
    /// `p95_max_dd` must not exceed this.
    pub max_p95_drawdown: f64,
    /// `worst_sharpe` must be at least this.
    pub min_worst_sharpe: f64,
}

impl Default for McThresholds {
    fn default() -> Self {
        Self {
            max_p95_drawdown: 0.35,
            min_worst_sharpe: -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McConfig {
    /// Resampled paths per block size (default 3000).
    pub iterations: usize,
    /// Block lengths in trades (default [5, 7, 10]).
    pub block_sizes: Vec<usize>,
    /// Master seed for the resampling streams.
    pub seed: u64,
    pub thresholds: McThresholds,
    /// Sharpe annualisation in trades per year. `None` derives it from the
    /// ledger's calendar span.
    pub trades_per_year: Option<f64>,
}

impl Default for McConfig {
    fn default() -> Self {
        Self {
            iterations: 3000,
            block_sizes: vec![5, 7, 10],
            seed: 42,
            thresholds: McThresholds::default(),
            trades_per_year: None,
        }
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Statistics of one resampled path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathStats {
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub cagr: f64,
}

/// Distribution summary for a single block size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSizeStats {
    pub block_size: usize,
    pub paths: usize,
    pub p95_max_dd: f64,
    pub worst_max_dd: f64,
    pub p05_cagr: f64,
    pub median_cagr: f64,
    pub p10_sharpe: f64,
    pub median_sharpe: f64,
    pub worst_sharpe: f64,
}

/// Distribution summary across every path of every block size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McAggregate {
    pub p95_max_dd: f64,
    pub worst_max_dd: f64,
    pub worst_sharpe: f64,
    pub p05_cagr: f64,
    pub median_sharpe: f64,
    pub p10_sharpe: f64,
    pub median_cagr: f64,
}

impl McAggregate {
    fn worst_case() -> Self {
        Self {
            p95_max_dd: WORST_DRAWDOWN,
            worst_max_dd: WORST_DRAWDOWN,
            worst_sharpe: WORST_SHARPE,
            p05_cagr: WORST_CAGR,
            median_sharpe: WORST_SHARPE,
            p10_sharpe: WORST_SHARPE,
            median_cagr: WORST_CAGR,
        }
    }
}

/// One threshold check and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McCheck {
    pub name: String,
    pub value: f64,
    pub limit: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McAcceptance {
    pub overall_pass: bool,
    pub checks: Vec<McCheck>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub trade_count: usize,
    pub iterations: usize,
    pub seed: u64,
    pub per_block_size: Vec<BlockSizeStats>,
    pub aggregated: McAggregate,
    pub acceptance: McAcceptance,
}

impl MonteCarloResult {
    /// Non-passing, worst-case result for a ledger with nothing to resample.
    pub fn empty(config: &McConfig) -> Self {
        Self {
            trade_count: 0,
            iterations: config.iterations,
            seed: config.seed,
            per_block_size: Vec::new(),
            aggregated: McAggregate::worst_case(),
            acceptance: McAcceptance {
                overall_pass: false,
                checks: Vec::new(),
            },
        }
    }

    pub fn passed(&self) -> bool {
        self.acceptance.overall_pass
    }
}

// ─── Validation ──────────────────────────────────────────────────────

/// Validate a trade ledger by block-bootstrap resampling.
pub fn validate(trades: &[SimTrade], config: &McConfig) -> MonteCarloResult {
    let returns: Vec<f64> = trades.iter().map(|t| t.net_return).collect();
    let years = ledger_years(trades);
    let trades_per_year = config.trades_per_year.unwrap_or_else(|| {
        if years > 0.0 {
            returns.len() as f64 / years
        } else {
            returns.len() as f64
        }
    });
    validate_returns(&returns, years, trades_per_year, config)
}

/// Validate a bare per-trade return series.
///
/// `years` is the calendar span the ledger covers (used for CAGR) and
/// `trades_per_year` annualises the per-path Sharpe.
pub fn validate_returns(
    returns: &[f64],
    years: f64,
    trades_per_year: f64,
    config: &McConfig,
) -> MonteCarloResult {
    let block_sizes: Vec<usize> = config.block_sizes.iter().copied().filter(|&b| b > 0).collect();
    if returns.is_empty() || config.iterations == 0 || block_sizes.is_empty() {
        debug!(trades = returns.len(), "monte carlo: nothing to resample");
        return MonteCarloResult::empty(config);
    }

    let rng = RngHierarchy::new(config.seed);
    let mut per_block_size = Vec::with_capacity(block_sizes.len());
    let mut all_paths = Vec::with_capacity(block_sizes.len() * config.iterations);

    for &block in &block_sizes {
        let stream = format!("mc/b={block}");
        let paths: Vec<PathStats> = (0..config.iterations)
            .into_par_iter()
            .map(|i| {
                let mut path_rng = rng.rng_for(&stream, i as u64);
                let path = resample_blocks(returns, block, &mut path_rng);
                path_stats(&path, years, trades_per_year)
            })
            .collect();
        per_block_size.push(summarize_block(block, &paths));
        all_paths.extend(paths);
    }

    let aggregated = aggregate(&all_paths);
    let acceptance = accept(&aggregated, &config.thresholds);
    debug!(
        trades = returns.len(),
        paths = all_paths.len(),
        p95_max_dd = aggregated.p95_max_dd,
        worst_sharpe = aggregated.worst_sharpe,
        pass = acceptance.overall_pass,
        "monte carlo validation complete"
    );

    MonteCarloResult {
        trade_count: returns.len(),
        iterations: config.iterations,
        seed: config.seed,
        per_block_size,
        aggregated,
        acceptance,
    }
}

/// Build one resampled path of exactly `returns.len()` entries from
/// contiguous blocks of `block` returns.
///
/// Block starts are uniform over `0..=n-b`; blocks never wrap. A block size
/// larger than the ledger is clamped to the ledger length. The final block is
/// truncated to hit the target length.
pub fn resample_blocks(returns: &[f64], block: usize, rng: &mut StdRng) -> Vec<f64> {
    let n = returns.len();
    let mut path = Vec::with_capacity(n);
    if n == 0 {
        return path;
    }
    let b = block.clamp(1, n);
    while path.len() < n {
        let start = rng.gen_range(0..=n - b);
        let take = b.min(n - path.len());
        path.extend_from_slice(&returns[start..start + take]);
    }
    path
}

/// Replay a path of trade returns through a compounding pass.
fn path_stats(path: &[f64], years: f64, trades_per_year: f64) -> PathStats {
    PathStats {
        sharpe: sharpe(path, trades_per_year),
        max_drawdown: max_drawdown(path),
        cagr: cagr(growth(path), years.max(1.0 / 365.25)),
    }
}

fn summarize_block(block_size: usize, paths: &[PathStats]) -> BlockSizeStats {
    let agg = aggregate(paths);
    BlockSizeStats {
        block_size,
        paths: paths.len(),
        p95_max_dd: agg.p95_max_dd,
        worst_max_dd: agg.worst_max_dd,
        p05_cagr: agg.p05_cagr,
        median_cagr: agg.median_cagr,
        p10_sharpe: agg.p10_sharpe,
        median_sharpe: agg.median_sharpe,
        worst_sharpe: agg.worst_sharpe,
    }
}

fn aggregate(paths: &[PathStats]) -> McAggregate {
    if paths.is_empty() {
        return McAggregate::worst_case();
    }
    let dds = sorted(&paths.iter().map(|p| p.max_drawdown).collect::<Vec<_>>());
    let sharpes = sorted(&paths.iter().map(|p| p.sharpe).collect::<Vec<_>>());
    let cagrs = sorted(&paths.iter().map(|p| p.cagr).collect::<Vec<_>>());

    McAggregate {
        p95_max_dd: percentile_sorted(&dds, 95.0),
        worst_max_dd: dds[dds.len() - 1],
        worst_sharpe: sharpes[0],
        p05_cagr: percentile_sorted(&cagrs, 5.0),
        median_sharpe: percentile_sorted(&sharpes, 50.0),
        p10_sharpe: percentile_sorted(&sharpes, 10.0),
        median_cagr: percentile_sorted(&cagrs, 50.0),
    }
}

fn accept(agg: &McAggregate, thresholds: &McThresholds) -> McAcceptance {
    let checks = vec![
        McCheck {
            name: "p95_max_dd".into(),
            value: agg.p95_max_dd,
            limit: thresholds.max_p95_drawdown,
            passed: agg.p95_max_dd <= thresholds.max_p95_drawdown,
        },
        McCheck {
            name: "worst_sharpe".into(),
            value: agg.worst_sharpe,
            limit: thresholds.min_worst_sharpe,
            passed: agg.worst_sharpe >= thresholds.min_worst_sharpe,
        },
    ];
    McAcceptance {
        overall_pass: checks.iter().all(|c| c.passed),
        checks,
    }
}

/// Calendar span of a ledger in years, from the first entry to the last exit.
pub fn ledger_years(trades: &[SimTrade]) -> f64 {
    let first = trades.iter().map(|t| t.entry_ts).min();
    let last = trades.iter().map(|t| t.exit_ts).max();
    match (first, last) {
        (Some(a), Some(b)) if b > a => (b - a).num_seconds() as f64 / (365.25 * 86_400.0),
        _ => 0.0,
    }
}
