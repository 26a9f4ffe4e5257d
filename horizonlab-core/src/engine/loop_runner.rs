//! Walk-forward step loop — the heart of the simulator.
//!
//! One iteration per `step_days` advance, strictly chronological:
//! 1. Position-level stop-loss against the step window's adverse extreme
//! 2. Mark-to-market at the step close
//! 3. Drawdown bookkeeping (inside every equity update)
//! 4. Drawdown-aware exposure multiplier
//! 5. Forecast query on the causal history slice (neutral on failure/timeout)
//! 6. Entropy guard scale
//! 7. Forced exits: hard kill, max hold, then signal flip / weak signal
//! 8. Entry
//! 9. Regime, horizon-usage, consensus and entropy statistics; monthly samples
//!
//! A position still open on the final step is closed as end-of-data.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, trace};

use crate::domain::{
    AssembledSignal, Direction, ExitReason, Horizon, OpenPosition, Position, PriceBar, Regime,
    Side, SimTrade,
};
use crate::entropy_guard::{self, GuardDecision, GuardReason};
use crate::oracle::{Forecast, ForecastError, Forecaster};
use crate::params::RiskParams;
use crate::telemetry::{EventKind, Telemetry};

use super::result::{
    compute_metrics, ConsensusStats, EntropyStats, EquityPoint, EquitySample, SimResult,
};
use super::state::{SimConfig, SimError, SimState};

/// Run one walk-forward simulation over `bars`.
///
/// `bars` must be strictly ordered. The forecaster only ever sees bars with
/// `timestamp <= as_of` for the step being simulated.
pub fn simulate(
    bars: &[PriceBar],
    config: &SimConfig,
    forecaster: &dyn Forecaster,
) -> Result<SimResult, SimError> {
    config.validate()?;
    if let Some(index) = bars.windows(2).position(|w| w[0].timestamp >= w[1].timestamp) {
        return Err(SimError::UnorderedBars { index: index + 1 });
    }
    let steps = plan_steps(bars, config, forecaster.warmup_bars())?;

    match config.oracle_timeout_ms {
        None => Ok(drive(bars, config, &steps, forecaster, &mut Oracle::Inline(forecaster))),
        Some(limit_ms) => Ok(thread::scope(|scope| {
            let mut oracle = Oracle::Worker(OracleWorker::spawn(scope, bars, config, forecaster, limit_ms));
            drive(bars, config, &steps, forecaster, &mut oracle)
        })),
    }
}

fn drive(
    bars: &[PriceBar],
    config: &SimConfig,
    steps: &[usize],
    forecaster: &dyn Forecaster,
    oracle: &mut Oracle<'_>,
) -> SimResult {
    let mut run = Run::new(config, bars[steps[0]].timestamp);
    let mut prev_idx: Option<usize> = None;

    for (k, &idx) in steps.iter().enumerate() {
        let is_last = k + 1 == steps.len();
        let from = prev_idx.map_or(idx, |p| p + 1);
        prev_idx = Some(idx);
        let ts = bars[idx].timestamp;
        run.count_void(&bars[from..=idx], ts);
        let equity_before = run.state.equity;
        if !run.state.position.is_flat() {
            run.exposed_steps += 1;
        }

        match StepWindow::over(&bars[from..=idx]) {
            Some(window) => {
                run.step(&bars[..=idx], ts, &window, oracle, is_last);
                if is_last && !run.state.position.is_flat() {
                    run.close(window.close, ts, ExitReason::EndOfData);
                }
            }
            // nothing tradable this step; the ledger still closes at the last mark
            None if is_last && !run.state.position.is_flat() => {
                let mark = run.state.last_mark;
                run.close(mark, ts, ExitReason::EndOfData);
            }
            None => continue,
        }

        let step_return = if equity_before > 0.0 {
            run.state.equity / equity_before - 1.0
        } else {
            0.0
        };
        run.equity_curve.push(EquityPoint {
            timestamp: ts,
            equity: run.state.equity,
            drawdown: run.state.drawdown,
            step_return,
        });
    }

    run.finish(forecaster.name())
}

// ─── Oracle access ──────────────────────────────────────────────────

/// How the loop reaches the forecaster.
///
/// Without a timeout the forecaster is called inline. With one, calls run on
/// a worker thread and the loop waits at most the limit for each answer.
/// While a late call is still running, later steps go neutral without
/// queueing behind it, and its answer is dropped when it arrives.
enum Oracle<'s> {
    Inline(&'s dyn Forecaster),
    Worker(OracleWorker),
}

struct OracleRequest {
    seq: u64,
    /// History is `bars[..end]`.
    end: usize,
    as_of: DateTime<Utc>,
}

struct OracleReply {
    seq: u64,
    outcome: Result<Forecast, ForecastError>,
}

struct OracleWorker {
    name: String,
    requests: mpsc::Sender<OracleRequest>,
    replies: mpsc::Receiver<OracleReply>,
    limit: StdDuration,
    limit_ms: u64,
    next_seq: u64,
    in_flight: Option<(u64, Instant)>,
}

impl OracleWorker {
    fn spawn<'scope, 'env>(
        scope: &'scope thread::Scope<'scope, 'env>,
        bars: &'env [PriceBar],
        config: &'env SimConfig,
        forecaster: &'env dyn Forecaster,
        limit_ms: u64,
    ) -> Self {
        let (requests, inbox) = mpsc::channel::<OracleRequest>();
        let (outbox, replies) = mpsc::channel::<OracleReply>();
        scope.spawn(move || {
            // ends once the loop drops its sender
            for req in inbox {
                let outcome = forecaster.forecast(&bars[..req.end], req.as_of, &config.horizon);
                if outbox.send(OracleReply { seq: req.seq, outcome }).is_err() {
                    break;
                }
            }
        });
        Self {
            name: forecaster.name().to_string(),
            requests,
            replies,
            limit: StdDuration::from_millis(limit_ms),
            limit_ms,
            next_seq: 0,
            in_flight: None,
        }
    }

    fn ask(&mut self, end: usize, as_of: DateTime<Utc>) -> Result<Forecast, ForecastError> {
        if let Some((seq, started)) = self.in_flight {
            // drain the late reply if it has landed
            while let Ok(reply) = self.replies.try_recv() {
                if reply.seq == seq {
                    self.in_flight = None;
                }
            }
            if self.in_flight.is_some() {
                return Err(self.timeout(started));
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let started = Instant::now();
        if self.requests.send(OracleRequest { seq, end, as_of }).is_err() {
            return Err(ForecastError::Unavailable("oracle worker stopped".into()));
        }
        match self.replies.recv_timeout(self.limit) {
            Ok(reply) => reply.outcome,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                self.in_flight = Some((seq, started));
                Err(self.timeout(started))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(ForecastError::Unavailable("oracle worker stopped".into()))
            }
        }
    }

    fn timeout(&self, started: Instant) -> ForecastError {
        ForecastError::Timeout {
            elapsed_ms: started.elapsed().as_millis() as u64,
            limit_ms: self.limit_ms,
        }
    }
}

// ─── Step planning ──────────────────────────────────────────────────

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Last bar index with `timestamp <= t`.
fn last_at_or_before(bars: &[PriceBar], t: DateTime<Utc>) -> Option<usize> {
    bars.partition_point(|b| b.timestamp <= t).checked_sub(1)
}

/// Bar indices the loop visits, one per step, deduplicated over gaps.
fn plan_steps(bars: &[PriceBar], config: &SimConfig, warmup: usize) -> Result<Vec<usize>, SimError> {
    let start_ts = match config.start {
        Some(d) => day_start(d),
        None => match bars.get(warmup) {
            Some(b) => b.timestamp,
            None => {
                return Err(SimError::InsufficientData {
                    needed: warmup,
                    available: bars.len(),
                    start: bars.last().map_or(DateTime::<Utc>::UNIX_EPOCH, |b| b.timestamp),
                })
            }
        },
    };
    let end_ts = match (config.end, bars.last()) {
        (Some(d), _) => day_start(d) + Duration::days(1) - Duration::nanoseconds(1),
        (None, Some(b)) => b.timestamp,
        (None, None) => start_ts,
    };

    let available = bars.partition_point(|b| b.timestamp < start_ts);
    if available < warmup {
        return Err(SimError::InsufficientData {
            needed: warmup,
            available,
            start: start_ts,
        });
    }
    if end_ts < start_ts || bars.last().map_or(true, |b| b.timestamp < start_ts) {
        return Err(SimError::EmptyRange {
            start: start_ts,
            end: end_ts,
        });
    }

    let mut steps: Vec<usize> = Vec::new();
    let step = Duration::days(config.step_days);
    let mut t = start_ts;
    while t <= end_ts {
        if let Some(i) = last_at_or_before(bars, t) {
            if steps.last().map_or(true, |&l| i > l) {
                steps.push(i);
            }
        }
        t += step;
    }
    // trailing partial step so the last bar inside the range is always visited
    if let Some(i) = last_at_or_before(bars, end_ts) {
        if steps.last().map_or(true, |&l| i > l) {
            steps.push(i);
        }
    }
    if steps.is_empty() {
        return Err(SimError::EmptyRange {
            start: start_ts,
            end: end_ts,
        });
    }
    Ok(steps)
}

/// Bars between two step times folded into one OHLC range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StepWindow {
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl StepWindow {
    /// `None` if every bar in the slice is void.
    pub(crate) fn over(bars: &[PriceBar]) -> Option<StepWindow> {
        let mut valid = bars.iter().filter(|b| !b.is_void());
        let first = valid.next()?;
        let mut w = StepWindow {
            high: first.high,
            low: first.low,
            close: first.close,
        };
        for b in valid {
            w.high = w.high.max(b.high);
            w.low = w.low.min(b.low);
            w.close = b.close;
        }
        Some(w)
    }
}

// ─── Decision rules ─────────────────────────────────────────────────

/// Forced-exit rule for an open position, in priority order.
pub fn forced_exit(
    pos: &OpenPosition,
    signal: &AssembledSignal,
    drawdown: f64,
    risk: &RiskParams,
) -> Option<ExitReason> {
    if drawdown >= risk.hard_drawdown {
        return Some(ExitReason::HardKill);
    }
    if pos.hold_days >= risk.max_hold_days {
        return Some(ExitReason::MaxHold);
    }
    if pos.hold_days >= risk.min_hold_days {
        if pos.side.as_direction().opposes(signal.direction) {
            return Some(ExitReason::SignalFlip);
        }
        if signal.confidence < risk.exit_confidence_floor
            && signal.consensus_score < risk.exit_consensus_floor
        {
            return Some(ExitReason::WeakSignal);
        }
    }
    None
}

/// Raw entry size before the negligible-size check, or `None` if the signal
/// does not qualify for an entry.
pub fn entry_size(
    signal: &AssembledSignal,
    dd_mult: f64,
    guard_scale: f64,
    risk: &RiskParams,
) -> Option<f64> {
    if signal.direction == Direction::Neutral
        || signal.confidence <= risk.entry_confidence
        || signal.consensus_score < risk.entry_min_consensus
    {
        return None;
    }
    let base = (signal.confidence * 2.0).min(risk.max_size);
    let boost = if signal.consensus_score > risk.consensus_boost_threshold {
        risk.consensus_boost
    } else {
        1.0
    };
    Some(base * dd_mult * boost * guard_scale.clamp(0.0, 1.0))
}

// ─── Run state ──────────────────────────────────────────────────────

struct Run<'a> {
    config: &'a SimConfig,
    state: SimState,
    trades: Vec<SimTrade>,
    equity_curve: Vec<EquityPoint>,
    samples: Vec<EquitySample>,
    telemetry: Telemetry,
    regime_stats: BTreeMap<Regime, usize>,
    horizon_usage: BTreeMap<Horizon, usize>,
    consensus_stats: ConsensusStats,
    entropy_stats: EntropyStats,
    oracle_failures: usize,
    exposed_steps: usize,
    last_sample_month: Option<(i32, u32)>,
}

impl<'a> Run<'a> {
    fn new(config: &'a SimConfig, start: DateTime<Utc>) -> Self {
        Self {
            config,
            state: SimState::new(config.initial_equity, start),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            samples: Vec::new(),
            telemetry: Telemetry::new(),
            regime_stats: BTreeMap::new(),
            horizon_usage: BTreeMap::new(),
            consensus_stats: ConsensusStats::default(),
            entropy_stats: EntropyStats::default(),
            oracle_failures: 0,
            exposed_steps: 0,
            last_sample_month: None,
        }
    }

    fn step(
        &mut self,
        history: &[PriceBar],
        ts: DateTime<Utc>,
        window: &StepWindow,
        oracle: &mut Oracle<'_>,
        is_last: bool,
    ) {
        let config = self.config;
        let risk = &config.risk;

        // 1. stop-loss
        let stop_hit = self
            .state
            .open()
            .filter(|p| p.stop_breached(window.low, window.high, risk.stop_loss_fraction))
            .map(|p| p.stop_price(risk.stop_loss_fraction));
        if let Some(stop) = stop_hit {
            self.mark(stop, ts);
            self.close(stop, ts, ExitReason::StopLoss);
            return;
        }

        // 2-3. mark-to-market, drawdown
        self.mark(window.close, ts);

        // 4. exposure multiplier
        let dd_mult = risk.dd_multiplier(self.state.drawdown);
        self.telemetry.observe("dd_mult", dd_mult);

        // 5. forecast
        let forecast = self.query(history, ts, oracle);

        // 6. guard
        let decision = entropy_guard::eval(&forecast.signals, &config.guard, &mut self.state.guard);
        self.telemetry.observe("guard_scale", decision.scale);
        if decision.reason != GuardReason::None {
            self.telemetry.incr("guard_engaged");
            self.telemetry.record(
                ts,
                EventKind::GuardEngaged,
                format!("{:?} scale={:.3}", decision.reason, decision.scale),
            );
        }

        // 7. forced exits
        let exit = self
            .state
            .open()
            .and_then(|p| forced_exit(p, &forecast.assembled, self.state.drawdown, risk));
        if let Some(reason) = exit {
            self.close(window.close, ts, reason);
        }

        // 8. entry
        if !is_last {
            self.try_enter(&forecast.assembled, dd_mult, &decision, window.close, ts);
        }

        // 9. statistics
        self.record_stats(&forecast, &decision, ts);
    }

    fn query(&mut self, history: &[PriceBar], ts: DateTime<Utc>, oracle: &mut Oracle<'_>) -> Forecast {
        let (outcome, name) = match oracle {
            Oracle::Inline(forecaster) => (forecaster.forecast(history, ts, &self.config.horizon), forecaster.name()),
            Oracle::Worker(worker) => (worker.ask(history.len(), ts), worker.name.as_str()),
        };

        match outcome {
            Ok(forecast) => forecast,
            Err(err) => {
                debug!(%ts, forecaster = name, error = %err, "forecast failed, using neutral signal");
                self.oracle_failures += 1;
                let (kind, counter) = match err {
                    ForecastError::Timeout { .. } => (EventKind::OracleTimeout, "oracle_timeout"),
                    _ => (EventKind::OracleFailure, "oracle_failure"),
                };
                self.telemetry.incr(counter);
                self.telemetry.record(ts, kind, err.to_string());
                Forecast::neutral(ts)
            }
        }
    }

    /// Count void bars in a step window; they never reach pricing.
    fn count_void(&mut self, window: &[PriceBar], ts: DateTime<Utc>) {
        let void = window.iter().filter(|b| b.is_void()).count();
        if void > 0 {
            self.telemetry.add("void_bar", void as u64);
            self.telemetry
                .record(ts, EventKind::VoidBars, format!("{void} void bar(s) skipped"));
        }
    }

    fn try_enter(
        &mut self,
        signal: &AssembledSignal,
        dd_mult: f64,
        decision: &GuardDecision,
        price: f64,
        ts: DateTime<Utc>,
    ) {
        let config = self.config;
        let risk = &config.risk;
        if !self.state.position.is_flat()
            || self.state.in_cooldown(ts)
            || dd_mult <= risk.min_dd_multiplier
        {
            return;
        }
        let Some(size) = entry_size(signal, dd_mult, decision.scale, risk) else {
            return;
        };
        if size < risk.min_size {
            self.telemetry.incr("entry_skipped");
            self.telemetry.record(
                ts,
                EventKind::EntrySkipped,
                format!("size {size:.4} below {}", risk.min_size),
            );
            return;
        }
        let Some(side) = Side::from_direction(signal.direction) else {
            return;
        };
        self.open(side, size, price, ts);
    }

    fn mark(&mut self, price: f64, ts: DateTime<Utc>) {
        let last = self.state.last_mark;
        let step_pnl = match self.state.position.as_open_mut() {
            Some(pos) => {
                let r = if last > 0.0 {
                    pos.side.sign() * (price / last - 1.0) * pos.size
                } else {
                    0.0
                };
                pos.mark(price, ts);
                r
            }
            None => return,
        };
        self.state.last_mark = price;
        self.state.apply_return(step_pnl, ts);
    }

    fn open(&mut self, side: Side, size: f64, price: f64, ts: DateTime<Utc>) {
        self.state.position = Position::Open(OpenPosition {
            side,
            entry_price: price,
            entry_timestamp: ts,
            size,
            unrealized_pnl: 0.0,
            hold_days: 0,
        });
        self.state.last_mark = price;
        let cost = self.config.costs.half_cost(size);
        self.state.apply_return(-cost, ts);
        self.telemetry.incr("entries");
        self.telemetry
            .record(ts, EventKind::Entry, format!("{side:?} size={size:.4} @ {price:.4}"));
        trace!(%ts, ?side, size, price, "entry");
    }

    fn close(&mut self, price: f64, ts: DateTime<Utc>, reason: ExitReason) {
        let Some(pos) = self.state.position.close() else {
            return;
        };
        let config = self.config;
        let costs = &config.costs;
        self.state.apply_return(-costs.half_cost(pos.size), ts);

        let gross = pos.side.sign() * (price / pos.entry_price - 1.0) * pos.size;
        let net_return = gross - costs.round_trip() * pos.size;
        let trade = SimTrade {
            entry_ts: pos.entry_timestamp,
            exit_ts: ts,
            side: pos.side,
            entry_price: pos.entry_price,
            exit_price: price,
            size: pos.size,
            net_return,
            hold_days: (ts - pos.entry_timestamp).num_days(),
            exit_reason: reason,
        };

        let cooldown = config.risk.cooldowns.for_exit(reason);
        if cooldown > 0 {
            self.state.cooldown_until = Some(ts + Duration::days(cooldown));
            self.telemetry
                .record(ts, EventKind::Cooldown, format!("{cooldown}d after {reason:?}"));
        }
        self.telemetry.incr("exits");
        self.telemetry.observe("trade_return", net_return);
        self.telemetry.record(
            ts,
            EventKind::Exit,
            format!("{reason:?} {:?} net={net_return:.4}", pos.side),
        );
        trace!(%ts, ?reason, net_return, "exit");
        self.trades.push(trade);
    }

    fn record_stats(&mut self, forecast: &Forecast, decision: &GuardDecision, ts: DateTime<Utc>) {
        *self.regime_stats.entry(forecast.regime).or_insert(0) += 1;
        if let Some(h) = forecast.dominant_horizon() {
            *self.horizon_usage.entry(h).or_insert(0) += 1;
        }
        let consensus = forecast.assembled.consensus_score;
        self.consensus_stats
            .push(consensus, self.config.risk.entry_min_consensus);
        self.entropy_stats
            .push(decision.entropy_norm, decision.scale, decision.reason);

        let month = (ts.year(), ts.month());
        if self.last_sample_month != Some(month) {
            self.last_sample_month = Some(month);
            self.samples.push(EquitySample {
                date: ts.date_naive(),
                equity: self.state.equity,
                drawdown: self.state.drawdown,
                regime: forecast.regime,
                consensus,
            });
        }
    }

    fn finish(self, forecaster: &str) -> SimResult {
        let metrics = compute_metrics(
            &self.equity_curve,
            &self.trades,
            self.config.initial_equity,
            self.config.periods_per_year(),
            self.exposed_steps,
            (self.state.max_dd_start, self.state.max_dd_end),
        );
        debug!(
            forecaster,
            trades = metrics.trade_count,
            sharpe = metrics.sharpe,
            max_dd = metrics.max_drawdown,
            oracle_failures = self.oracle_failures,
            "simulation complete"
        );
        SimResult {
            forecaster: forecaster.to_string(),
            trades: self.trades,
            equity_curve: self.equity_curve,
            samples: self.samples,
            metrics,
            regime_stats: self.regime_stats,
            horizon_usage: self.horizon_usage,
            consensus_stats: self.consensus_stats,
            entropy_stats: self.entropy_stats,
            oracle_failures: self.oracle_failures,
            telemetry: self.telemetry,
        }
    }
}
