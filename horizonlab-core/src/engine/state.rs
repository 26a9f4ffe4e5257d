//! Simulator configuration, errors, and the mutable per-run state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{OpenPosition, Position};
use crate::entropy_guard::{EntropyGuardConfig, EntropyGuardState};
use crate::oracle::HorizonConfig;
use crate::params::{CostModel, RiskParams};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("insufficient data: forecaster needs {needed} bars before {start}, have {available}")]
    InsufficientData {
        needed: usize,
        available: usize,
        start: DateTime<Utc>,
    },

    #[error("no bars between {start} and {end}")]
    EmptyRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("bars are not strictly time-ordered (first violation at index {index})")]
    UnorderedBars { index: usize },

    #[error("invalid simulator config: {0}")]
    InvalidConfig(String),
}

/// Configuration for a single simulator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// First step date. `None` starts as soon as the forecaster is warmed up.
    pub start: Option<NaiveDate>,
    /// Last date considered. `None` runs to the last bar.
    pub end: Option<NaiveDate>,
    pub step_days: i64,
    pub initial_equity: f64,
    pub horizon: HorizonConfig,
    pub guard: EntropyGuardConfig,
    pub costs: CostModel,
    pub risk: RiskParams,
    /// Upper bound on how long a step waits for a forecast. Set, the
    /// forecaster runs on a worker thread; a step that hits the limit goes
    /// neutral, as do later steps while the late call is still running.
    pub oracle_timeout_ms: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            step_days: 7,
            initial_equity: 10_000.0,
            horizon: HorizonConfig::default(),
            guard: EntropyGuardConfig::default(),
            costs: CostModel::default(),
            risk: RiskParams::default(),
            oracle_timeout_ms: None,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.step_days < 1 {
            return Err(SimError::InvalidConfig(format!(
                "step_days must be >= 1, got {}",
                self.step_days
            )));
        }
        if self.initial_equity.is_nan() || self.initial_equity <= 0.0 {
            return Err(SimError::InvalidConfig("initial_equity must be positive".into()));
        }
        if let (Some(s), Some(e)) = (self.start, self.end) {
            if e < s {
                return Err(SimError::InvalidConfig(format!("end {e} precedes start {s}")));
            }
        }
        self.risk.validate().map_err(SimError::InvalidConfig)?;
        self.guard.validate().map_err(SimError::InvalidConfig)?;
        Ok(())
    }

    /// Annualization factor for step returns: 364 / step_days.
    pub fn periods_per_year(&self) -> f64 {
        364.0 / self.step_days.max(1) as f64
    }
}

/// Mutable state owned by one run. Never shared across runs.
#[derive(Debug, Clone)]
pub struct SimState {
    pub equity: f64,
    pub peak: f64,
    pub drawdown: f64,
    pub max_drawdown: f64,
    pub peak_ts: DateTime<Utc>,
    pub max_dd_start: Option<DateTime<Utc>>,
    pub max_dd_end: Option<DateTime<Utc>>,
    pub position: Position,
    /// Price the open position was last marked at.
    pub last_mark: f64,
    /// No entries before this time.
    pub cooldown_until: Option<DateTime<Utc>>,
    pub guard: EntropyGuardState,
}

impl SimState {
    pub fn new(initial_equity: f64, start: DateTime<Utc>) -> Self {
        Self {
            equity: initial_equity,
            peak: initial_equity,
            drawdown: 0.0,
            max_drawdown: 0.0,
            peak_ts: start,
            max_dd_start: None,
            max_dd_end: None,
            position: Position::Flat,
            last_mark: 0.0,
            cooldown_until: None,
            guard: EntropyGuardState::default(),
        }
    }

    /// Compound a return into equity and refresh peak/drawdown bookkeeping.
    /// Every equity change goes through here.
    pub fn apply_return(&mut self, r: f64, ts: DateTime<Utc>) {
        self.equity = (self.equity * (1.0 + r)).max(0.0);
        if self.equity > self.peak {
            self.peak = self.equity;
            self.peak_ts = ts;
        }
        self.drawdown = if self.peak > 0.0 {
            (self.peak - self.equity) / self.peak
        } else {
            1.0
        };
        if self.drawdown > self.max_drawdown {
            self.max_drawdown = self.drawdown;
            self.max_dd_start = Some(self.peak_ts);
            self.max_dd_end = Some(ts);
        }
    }

    pub fn in_cooldown(&self, ts: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| ts < until)
    }

    pub fn open(&self) -> Option<&OpenPosition> {
        self.position.as_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(d: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(d)
    }

    #[test]
    fn default_config_validates() {
        assert!(SimConfig::default().validate().is_ok());
        assert!((SimConfig::default().periods_per_year() - 52.0).abs() < 1e-12);
    }

    #[test]
    fn zero_step_rejected() {
        let cfg = SimConfig {
            step_days: 0,
            ..SimConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn drawdown_bookkeeping_tracks_dates() {
        let mut s = SimState::new(100.0, t(0));
        s.apply_return(0.10, t(7));
        s.apply_return(-0.20, t(14));
        s.apply_return(0.05, t(21));
        assert!((s.peak - 110.0).abs() < 1e-9);
        assert!((s.max_drawdown - 0.20).abs() < 1e-12);
        assert_eq!(s.max_dd_start, Some(t(7)));
        assert_eq!(s.max_dd_end, Some(t(14)));
        assert!(s.drawdown < s.max_drawdown);
    }

    #[test]
    fn cooldown_window_is_half_open() {
        let mut s = SimState::new(1.0, t(0));
        s.cooldown_until = Some(t(7));
        assert!(s.in_cooldown(t(6)));
        assert!(!s.in_cooldown(t(7)));
    }
}
