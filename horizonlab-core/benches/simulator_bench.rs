//! Criterion benchmarks for the simulator hot path.
//!
//! Benchmarks:
//! 1. Full walk-forward run with the trailing-momentum forecaster
//! 2. Entropy guard evaluation
//! 3. Signal assembly

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use horizonlab_core::domain::{Direction, Horizon, HorizonSignal, PriceBar, Regime};
use horizonlab_core::engine::{simulate, SimConfig};
use horizonlab_core::entropy_guard::{self, EntropyGuardConfig, EntropyGuardState};
use horizonlab_core::oracle::{Forecast, HorizonConfig, TrailingMomentumForecaster};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<PriceBar> {
    let t0 = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 * (0.3 * (i as f64 / 45.0).sin() + 0.02 * (i as f64 * 0.7).cos()).exp();
            let open = close * 0.999;
            PriceBar {
                symbol: "BENCH".into(),
                timestamp: t0 + Duration::days(i as i64),
                open,
                high: close * 1.01,
                low: open * 0.99,
                close,
            }
        })
        .collect()
}

fn mixed_signals() -> Vec<HorizonSignal> {
    let dirs = [Direction::Long, Direction::Long, Direction::Short, Direction::Neutral];
    Horizon::ALL
        .iter()
        .zip(dirs)
        .map(|(&horizon, direction)| HorizonSignal {
            horizon,
            direction,
            strength: direction.sign() * 0.03,
            confidence: 0.7,
        })
        .collect()
}

// ── 1. Simulator ─────────────────────────────────────────────────────

fn bench_simulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate");
    let forecaster = TrailingMomentumForecaster::default();
    for &n in &[500usize, 2_000] {
        let bars = make_bars(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &bars, |b, bars| {
            b.iter(|| simulate(black_box(bars), &SimConfig::default(), &forecaster))
        });
    }
    group.finish();
}

// ── 2. Entropy guard ─────────────────────────────────────────────────

fn bench_guard(c: &mut Criterion) {
    let signals = mixed_signals();
    let cfg = EntropyGuardConfig::default();
    c.bench_function("entropy_guard_eval", |b| {
        let mut state = EntropyGuardState::default();
        b.iter(|| entropy_guard::eval(black_box(&signals), &cfg, &mut state))
    });
}

// ── 3. Assembly ──────────────────────────────────────────────────────

fn bench_assemble(c: &mut Criterion) {
    let signals = mixed_signals();
    let cfg = HorizonConfig::default();
    let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    c.bench_function("forecast_assemble", |b| {
        b.iter(|| Forecast::assemble(t, black_box(signals.clone()), Regime::Bull, &cfg))
    });
}

criterion_group!(benches, bench_simulate, bench_guard, bench_assemble);
criterion_main!(benches);
