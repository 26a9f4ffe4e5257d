//! Return-series metrics — pure functions shared by the simulator and the
//! Monte Carlo validator.
//!
//! Everything here works on per-period simple returns (one entry per simulator
//! step, or one entry per trade for a bootstrap path). Drawdowns are positive
//! fractions: 0.25 means equity sits 25% under its running peak.

/// Arithmetic mean. 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1). 0.0 with fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Annualized Sharpe: `mean / std * sqrt(periods_per_year)`.
///
/// Returns 0.0 for fewer than two returns or zero variance.
pub fn sharpe(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let sd = std_dev(returns);
    if sd < 1e-15 {
        return 0.0;
    }
    mean(returns) / sd * periods_per_year.max(0.0).sqrt()
}

/// Compounded growth factor of a return series (1.0 = flat).
pub fn growth(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |eq, r| eq * (1.0 + r))
}

/// Compound annual growth rate from a growth factor over `years`.
///
/// A wiped-out account (growth <= 0) reports -1.0.
pub fn cagr(growth: f64, years: f64) -> f64 {
    if growth <= 0.0 {
        return -1.0;
    }
    if years <= 0.0 {
        return 0.0;
    }
    growth.powf(1.0 / years) - 1.0
}

/// Maximum peak-to-trough drawdown of the equity path implied by `returns`,
/// starting from equity 1.0.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut max_dd = 0.0_f64;
    for r in returns {
        equity *= 1.0 + r;
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
    }
    max_dd.min(1.0)
}

/// Percentile (0..=100) of a sorted slice using linear interpolation.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Sort a copy of `values` ascending, NaNs last.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}
