//! Shared fixtures for runner integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use horizonlab_core::domain::{
    Direction, ExitReason, Horizon, HorizonSignal, PriceBar, Regime, Side, SimTrade,
};
use horizonlab_core::engine::SimConfig;
use horizonlab_core::oracle::{Forecast, ForecastError, Forecaster, HorizonConfig};
use horizonlab_runner::data_loader::generate_synthetic_bars;
use horizonlab_runner::monte_carlo::McConfig;
use horizonlab_runner::optimizer::{OptimizeConfig, RefineConfig};
use horizonlab_runner::scoring::{PenaltyConfig, Scorer};

/// Each horizon alternates LONG/SHORT every `horizon.days()` days, so the
/// assembled direction depends on the weights and positions flip often.
pub struct Cycle {
    /// Panics when asked to forecast with `w7` above this.
    pub panic_above_w7: Option<f64>,
}

impl Cycle {
    pub fn new() -> Self {
        Self { panic_above_w7: None }
    }

    pub fn panicking_above(limit: f64) -> Self {
        Self {
            panic_above_w7: Some(limit),
        }
    }
}

impl Forecaster for Cycle {
    fn name(&self) -> &str {
        "cycle"
    }

    fn warmup_bars(&self) -> usize {
        5
    }

    fn forecast(
        &self,
        _history: &[PriceBar],
        as_of: DateTime<Utc>,
        config: &HorizonConfig,
    ) -> Result<Forecast, ForecastError> {
        if let Some(limit) = self.panic_above_w7 {
            if config.weights.w7() > limit {
                panic!("cycle forecaster rejects w7 = {:.2}", config.weights.w7());
            }
        }
        let days = as_of.timestamp().div_euclid(86_400);
        let signals = Horizon::ALL
            .iter()
            .map(|&h| {
                let phase = (days / h.days() as i64) % 2;
                let direction = if phase == 0 { Direction::Long } else { Direction::Short };
                HorizonSignal {
                    horizon: h,
                    direction,
                    strength: direction.sign() * 0.01 * (h.index() + 1) as f64,
                    confidence: 0.6 + 0.1 * h.index() as f64,
                }
            })
            .collect();
        Ok(Forecast::assemble(as_of, signals, Regime::Sideways, config))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Three years of deterministic daily synthetic bars.
pub fn bars() -> Vec<PriceBar> {
    generate_synthetic_bars("SYN", date(2020, 1, 1), date(2022, 12, 31), 7)
}

pub fn quick_mc() -> McConfig {
    McConfig {
        iterations: 200,
        ..McConfig::default()
    }
}

pub fn quick_optimize() -> OptimizeConfig {
    OptimizeConfig {
        scorer: Scorer {
            penalties: PenaltyConfig {
                min_trades: 2,
                ..PenaltyConfig::default()
            },
            ..Scorer::default()
        },
        refine: RefineConfig {
            patience: 4,
            max_iterations: 10,
            top_k: 2,
            seed: Some(99),
            ..RefineConfig::default()
        },
        ..OptimizeConfig::default()
    }
}

pub fn sim_config() -> SimConfig {
    SimConfig::default()
}

/// Ledger of `returns.len()` weekly trades starting 2024-01-01.
pub fn ledger(returns: &[f64]) -> Vec<SimTrade> {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    returns
        .iter()
        .enumerate()
        .map(|(i, &r)| SimTrade {
            entry_ts: t0 + Duration::days(7 * i as i64),
            exit_ts: t0 + Duration::days(7 * i as i64 + 6),
            side: Side::Long,
            entry_price: 100.0,
            exit_price: 100.0 * (1.0 + r),
            size: 1.0,
            net_return: r,
            hold_days: 6,
            exit_reason: ExitReason::SignalFlip,
        })
        .collect()
}
