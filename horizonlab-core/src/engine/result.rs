//! Simulator output: trade ledger, equity curve, metrics and run statistics.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Horizon, Regime, SimTrade};
use crate::entropy_guard::GuardReason;
use crate::metrics;
use crate::telemetry::Telemetry;

/// Equity after every simulated step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub drawdown: f64,
    /// Simple return of this step, costs included.
    pub step_return: f64,
}

/// Monthly snapshot for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquitySample {
    pub date: NaiveDate,
    pub equity: f64,
    pub drawdown: f64,
    pub regime: Regime,
    pub consensus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearMetrics {
    pub year: i32,
    pub total_return: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub trades_closed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimMetrics {
    pub sharpe: f64,
    pub cagr: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub max_dd_start: Option<DateTime<Utc>>,
    pub max_dd_end: Option<DateTime<Utc>>,
    pub win_rate: f64,
    pub trade_count: usize,
    pub avg_trade_return: f64,
    pub avg_hold_days: f64,
    /// Fraction of steps spent holding a position.
    pub exposure: f64,
    pub steps: usize,
    pub final_equity: f64,
    pub per_year: Vec<YearMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusStats {
    pub samples: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Steps whose consensus reached the entry minimum.
    pub steps_at_entry_level: usize,
}

impl ConsensusStats {
    pub(crate) fn push(&mut self, consensus: f64, entry_min: f64) {
        if self.samples == 0 {
            self.min = consensus;
            self.max = consensus;
        } else {
            self.min = self.min.min(consensus);
            self.max = self.max.max(consensus);
        }
        self.samples += 1;
        self.mean += (consensus - self.mean) / self.samples as f64;
        if consensus >= entry_min {
            self.steps_at_entry_level += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntropyStats {
    pub evaluations: usize,
    pub mean_entropy: f64,
    pub mean_scale: f64,
    pub min_scale: f64,
    pub reasons: BTreeMap<String, usize>,
}

impl Default for EntropyStats {
    fn default() -> Self {
        Self {
            evaluations: 0,
            mean_entropy: 0.0,
            mean_scale: 1.0,
            min_scale: 1.0,
            reasons: BTreeMap::new(),
        }
    }
}

impl EntropyStats {
    pub(crate) fn push(&mut self, entropy: f64, scale: f64, reason: GuardReason) {
        self.evaluations += 1;
        let n = self.evaluations as f64;
        self.mean_entropy += (entropy - self.mean_entropy) / n;
        self.mean_scale += (scale - self.mean_scale) / n;
        self.min_scale = self.min_scale.min(scale);
        let key = match reason {
            GuardReason::None => "none",
            GuardReason::Warn => "warn",
            GuardReason::Hard => "hard",
            GuardReason::Dominance => "dominance",
        };
        *self.reasons.entry(key.to_string()).or_insert(0) += 1;
    }
}

/// Everything a completed run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimResult {
    pub forecaster: String,
    pub trades: Vec<SimTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub samples: Vec<EquitySample>,
    pub metrics: SimMetrics,
    pub regime_stats: BTreeMap<Regime, usize>,
    /// Steps on which each horizon carried the largest |strength|.
    pub horizon_usage: BTreeMap<Horizon, usize>,
    pub consensus_stats: ConsensusStats,
    pub entropy_stats: EntropyStats,
    pub oracle_failures: usize,
    pub telemetry: Telemetry,
}

impl SimResult {
    pub fn step_returns(&self) -> Vec<f64> {
        self.equity_curve.iter().map(|p| p.step_return).collect()
    }
}

// ─── Metric computation ─────────────────────────────────────────────

pub(crate) fn compute_metrics(
    equity_curve: &[EquityPoint],
    trades: &[SimTrade],
    initial_equity: f64,
    periods_per_year: f64,
    exposed_steps: usize,
    max_dd_dates: (Option<DateTime<Utc>>, Option<DateTime<Utc>>),
) -> SimMetrics {
    let returns: Vec<f64> = equity_curve.iter().map(|p| p.step_return).collect();
    let final_equity = equity_curve.last().map_or(initial_equity, |p| p.equity);
    let growth = if initial_equity > 0.0 {
        final_equity / initial_equity
    } else {
        0.0
    };
    let years = match (equity_curve.first(), equity_curve.last()) {
        (Some(a), Some(b)) => (b.timestamp - a.timestamp).num_days() as f64 / 365.25,
        _ => 0.0,
    };
    let trade_count = trades.len();
    let wins = trades.iter().filter(|t| t.is_winner()).count();
    let steps = equity_curve.len();

    SimMetrics {
        sharpe: metrics::sharpe(&returns, periods_per_year),
        cagr: metrics::cagr(growth, years),
        total_return: growth - 1.0,
        max_drawdown: metrics::max_drawdown(&returns),
        max_dd_start: max_dd_dates.0,
        max_dd_end: max_dd_dates.1,
        win_rate: if trade_count > 0 {
            wins as f64 / trade_count as f64
        } else {
            0.0
        },
        trade_count,
        avg_trade_return: metrics::mean(&trades.iter().map(|t| t.net_return).collect::<Vec<_>>()),
        avg_hold_days: metrics::mean(&trades.iter().map(|t| t.hold_days as f64).collect::<Vec<_>>()),
        exposure: if steps > 0 {
            exposed_steps as f64 / steps as f64
        } else {
            0.0
        },
        steps,
        final_equity,
        per_year: per_year(equity_curve, trades, periods_per_year),
    }
}

fn per_year(equity_curve: &[EquityPoint], trades: &[SimTrade], periods_per_year: f64) -> Vec<YearMetrics> {
    let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for p in equity_curve {
        by_year.entry(p.timestamp.year()).or_default().push(p.step_return);
    }
    by_year
        .into_iter()
        .map(|(year, returns)| YearMetrics {
            year,
            total_return: metrics::growth(&returns) - 1.0,
            sharpe: metrics::sharpe(&returns, periods_per_year),
            max_drawdown: metrics::max_drawdown(&returns),
            trades_closed: trades.iter().filter(|t| t.exit_ts.year() == year).count(),
        })
        .collect()
}
