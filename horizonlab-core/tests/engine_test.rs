//! Integration tests for the walk-forward simulator with scripted forecasters.

use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, TimeZone, Utc};
use horizonlab_core::domain::{
    Direction, ExitReason, Horizon, HorizonSignal, PriceBar, Regime, Side,
};
use horizonlab_core::engine::{simulate, SimConfig};
use horizonlab_core::entropy_guard::EntropyGuardConfig;
use horizonlab_core::oracle::{Forecast, ForecastError, Forecaster, HorizonConfig};
use horizonlab_core::params::dd_multiplier;
use horizonlab_core::telemetry::EventKind;

// ── Helpers ──────────────────────────────────────────────────────────

fn day(d: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(d)
}

fn bar(d: i64, open: f64, high: f64, low: f64, close: f64) -> PriceBar {
    PriceBar {
        symbol: "BTC".into(),
        timestamp: day(d),
        open,
        high,
        low,
        close,
    }
}

fn flat(n: i64, price: f64) -> Vec<PriceBar> {
    (0..n).map(|d| bar(d, price, price, price, price)).collect()
}

/// Returns the same per-horizon directions and confidence at every step.
struct Scripted {
    directions: [Direction; 4],
    confidence: f64,
}

impl Scripted {
    fn always(direction: Direction, confidence: f64) -> Self {
        Self {
            directions: [direction; 4],
            confidence,
        }
    }
}

impl Forecaster for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn warmup_bars(&self) -> usize {
        10
    }

    fn forecast(
        &self,
        _history: &[PriceBar],
        as_of: DateTime<Utc>,
        config: &HorizonConfig,
    ) -> Result<Forecast, ForecastError> {
        let signals = Horizon::ALL
            .iter()
            .zip(self.directions)
            .map(|(&h, d)| HorizonSignal {
                horizon: h,
                direction: d,
                strength: d.sign() * 0.01,
                confidence: self.confidence,
            })
            .collect();
        Ok(Forecast::assemble(as_of, signals, Regime::Bull, config))
    }
}

struct Broken;

impl Forecaster for Broken {
    fn name(&self) -> &str {
        "broken"
    }
    fn warmup_bars(&self) -> usize {
        10
    }
    fn forecast(
        &self,
        _history: &[PriceBar],
        _as_of: DateTime<Utc>,
        _config: &HorizonConfig,
    ) -> Result<Forecast, ForecastError> {
        Err(ForecastError::Unavailable("upstream down".into()))
    }
}

/// Sleeps for the given delay before answering.
struct Slow(Scripted, u64);

impl Forecaster for Slow {
    fn name(&self) -> &str {
        "slow"
    }
    fn warmup_bars(&self) -> usize {
        self.0.warmup_bars()
    }
    fn forecast(
        &self,
        history: &[PriceBar],
        as_of: DateTime<Utc>,
        config: &HorizonConfig,
    ) -> Result<Forecast, ForecastError> {
        std::thread::sleep(StdDuration::from_millis(self.1));
        self.0.forecast(history, as_of, config)
    }
}

// ── Stop-loss, cooldown and drawdown-scaled re-entry ─────────────────

#[test]
fn stop_loss_then_scaled_reentry() {
    // flat at 100, a crash through the 15% stop on day 14, flat at 90 after
    let mut bars = flat(14, 100.0);
    bars.push(bar(14, 100.0, 100.0, 80.0, 90.0));
    bars.extend((15..60).map(|d| bar(d, 90.0, 90.0, 90.0, 90.0)));

    let config = SimConfig::default();
    let result = simulate(&bars, &config, &Scripted::always(Direction::Long, 0.9)).unwrap();

    assert_eq!(result.trades.len(), 2, "trades: {:?}", result.trades);
    let stop = &result.trades[0];
    assert_eq!(stop.exit_reason, ExitReason::StopLoss);
    assert_eq!(stop.side, Side::Long);
    assert_eq!(stop.entry_ts, day(10));
    assert_eq!(stop.exit_ts, day(17));
    assert!((stop.exit_price - 85.0).abs() < 1e-9);
    // size = min(2, 0.9*2) * 1.0 * 1.2 boost * 1.0 guard
    assert!((stop.size - 2.16).abs() < 1e-9);
    assert!((stop.net_return - (-0.15 * 2.16 - 0.003 * 2.16)).abs() < 1e-9);

    // 14-day cooldown: no entry at day 24, entry at day 31
    let second = &result.trades[1];
    assert_eq!(second.entry_ts, day(31));
    assert_eq!(second.exit_reason, ExitReason::EndOfData);
    let dd_at_entry = result
        .equity_curve
        .iter()
        .find(|p| p.timestamp == day(24))
        .unwrap()
        .drawdown;
    let expected = 2.16 * dd_multiplier(dd_at_entry, 0.20, 0.40);
    assert!((second.size - expected).abs() < 1e-9);
    assert!(second.size < stop.size);
}

#[test]
fn equity_accounts_for_costs_on_flat_prices() {
    let bars = flat(60, 100.0);
    let result = simulate(&bars, &SimConfig::default(), &Scripted::always(Direction::Short, 0.9)).unwrap();
    assert_eq!(result.trades.len(), 1);
    let t = &result.trades[0];
    assert_eq!(t.side, Side::Short);
    assert_eq!(t.exit_reason, ExitReason::EndOfData);
    assert!((t.net_return + 0.003 * t.size).abs() < 1e-12);
    let expected = 10_000.0 * (1.0 - 0.0015 * t.size).powi(2);
    assert!((result.metrics.final_equity - expected).abs() < 1e-6);
    assert!(result.metrics.exposure > 0.0);
}

#[test]
fn max_hold_forces_exit() {
    let bars = flat(200, 100.0);
    let result = simulate(&bars, &SimConfig::default(), &Scripted::always(Direction::Long, 0.9)).unwrap();
    let first = &result.trades[0];
    assert_eq!(first.exit_reason, ExitReason::MaxHold);
    assert!(first.hold_days >= 90);
    // max-hold cooldown is 7 days: re-entry on the following step
    assert_eq!(result.trades[1].entry_ts, first.exit_ts + Duration::days(7));
}

// ── Oracle failure handling ──────────────────────────────────────────

#[test]
fn oracle_failure_degrades_to_neutral() {
    let bars = flat(60, 100.0);
    let result = simulate(&bars, &SimConfig::default(), &Broken).unwrap();
    assert!(result.trades.is_empty());
    assert_eq!(result.oracle_failures, result.equity_curve.len());
    assert_eq!(
        result.telemetry.count("oracle_failure") as usize,
        result.equity_curve.len()
    );
    assert_eq!(result.regime_stats.get(&Regime::Unknown).copied(), Some(result.equity_curve.len()));
}

#[test]
fn slow_oracle_times_out_to_neutral() {
    let bars = flat(30, 100.0);
    let config = SimConfig {
        oracle_timeout_ms: Some(1),
        ..SimConfig::default()
    };
    let result = simulate(&bars, &config, &Slow(Scripted::always(Direction::Long, 0.9), 20)).unwrap();
    assert!(result.trades.is_empty());
    assert!(result.telemetry.count("oracle_timeout") > 0);
}

#[test]
fn slow_oracle_does_not_stall_the_loop() {
    // 8 steps; waiting out every 300 ms call would take 2.4 s
    let bars = flat(60, 100.0);
    let config = SimConfig {
        oracle_timeout_ms: Some(5),
        ..SimConfig::default()
    };
    let started = Instant::now();
    let result = simulate(&bars, &config, &Slow(Scripted::always(Direction::Long, 0.9), 300)).unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < StdDuration::from_millis(1_000), "took {elapsed:?}");
    assert!(result.trades.is_empty());
    assert_eq!(
        result.telemetry.count("oracle_timeout") as usize,
        result.equity_curve.len()
    );
    assert_eq!(result.telemetry.events_of(EventKind::OracleTimeout).count(), result.equity_curve.len());
}

#[test]
fn fast_oracle_behind_timeout_matches_inline() {
    let bars = flat(60, 100.0);
    let f = Scripted::always(Direction::Long, 0.9);
    let inline = simulate(&bars, &SimConfig::default(), &f).unwrap();
    let bounded = simulate(
        &bars,
        &SimConfig {
            oracle_timeout_ms: Some(5_000),
            ..SimConfig::default()
        },
        &f,
    )
    .unwrap();
    assert_eq!(inline.trades, bounded.trades);
    assert_eq!(inline.equity_curve, bounded.equity_curve);
    assert_eq!(bounded.telemetry.count("oracle_timeout"), 0);
}

// ── Void bars ────────────────────────────────────────────────────────

#[test]
fn void_final_bar_still_closes_at_last_mark() {
    let mut bars = flat(40, 100.0);
    bars[39].close = f64::NAN;
    let result = simulate(&bars, &SimConfig::default(), &Scripted::always(Direction::Long, 0.9)).unwrap();

    assert_eq!(result.trades.len(), 1, "trades: {:?}", result.trades);
    let t = &result.trades[0];
    assert_eq!(t.exit_reason, ExitReason::EndOfData);
    assert_eq!(t.exit_ts, day(39));
    assert_eq!(t.exit_price, 100.0);
    assert_eq!(result.telemetry.count("void_bar"), 1);
}

#[test]
fn zero_and_infinite_prices_are_skipped_and_counted() {
    let mut bars = flat(40, 100.0);
    // day 24 is a step bar; a zero mark would wipe the position out
    bars[24].close = 0.0;
    bars[30].high = f64::INFINITY;
    let result = simulate(&bars, &SimConfig::default(), &Scripted::always(Direction::Long, 0.9)).unwrap();

    assert_eq!(result.telemetry.count("void_bar"), 2);
    assert_eq!(result.telemetry.events_of(EventKind::VoidBars).count(), 2);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_reason, ExitReason::EndOfData);
    assert!(result.metrics.max_drawdown < 0.01);
}

// ── Entropy guard ────────────────────────────────────────────────────

#[test]
fn guard_shrinks_entries_under_disagreement() {
    let bars = flat(40, 100.0);
    let mixed = Scripted {
        directions: [Direction::Long, Direction::Long, Direction::Short, Direction::Neutral],
        confidence: 0.9,
    };

    let guarded = simulate(&bars, &SimConfig::default(), &mixed).unwrap();
    let unguarded = simulate(
        &bars,
        &SimConfig {
            guard: EntropyGuardConfig::disabled(),
            ..SimConfig::default()
        },
        &mixed,
    )
    .unwrap();

    assert!((unguarded.trades[0].size - 1.8).abs() < 1e-9);
    assert!((guarded.trades[0].size - 0.45).abs() < 1e-9);
    assert!(guarded.entropy_stats.min_scale < 1.0);
    assert_eq!(unguarded.entropy_stats.min_scale, 1.0);

    let engaged = guarded.telemetry.events_of(EventKind::GuardEngaged).count() as u64;
    assert!(engaged > 0);
    assert_eq!(engaged, guarded.telemetry.count("guard_engaged"));
    assert_eq!(unguarded.telemetry.events_of(EventKind::GuardEngaged).count(), 0);
}

// ── Determinism and ledger invariants ────────────────────────────────

#[test]
fn identical_inputs_identical_results() {
    let mut bars = flat(14, 100.0);
    bars.push(bar(14, 100.0, 100.0, 80.0, 90.0));
    bars.extend((15..120).map(|d| bar(d, 90.0, 91.0, 89.0, 90.0)));
    let f = Scripted::always(Direction::Long, 0.8);
    let a = simulate(&bars, &SimConfig::default(), &f).unwrap();
    let b = simulate(&bars, &SimConfig::default(), &f).unwrap();
    assert_eq!(a.trades, b.trades);
    assert_eq!(a.equity_curve, b.equity_curve);
    assert_eq!(a.metrics, b.metrics);
}

#[test]
fn trades_never_overlap() {
    let bars = flat(400, 100.0);
    let result = simulate(&bars, &SimConfig::default(), &Scripted::always(Direction::Long, 0.9)).unwrap();
    assert!(result.trades.len() > 2);
    for w in result.trades.windows(2) {
        assert!(w[1].entry_ts >= w[0].exit_ts);
    }
}
