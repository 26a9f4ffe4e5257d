//! Forecaster capability — the oracle the simulator queries at every step.
//!
//! The simulator only ever sees `&dyn Forecaster`. Implementations receive the
//! causal slice of history (every bar with `timestamp <= as_of`) and nothing
//! else, so lookahead is impossible through this interface.
//!
//! Blending per-horizon signals into an [`AssembledSignal`] is deterministic
//! given the active [`HorizonWeights`]; implementations are expected to build
//! their [`Forecast`] through [`Forecast::assemble`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    AssembledSignal, Direction, Horizon, HorizonSignal, HorizonWeights, PriceBar, Regime,
};
use crate::metrics;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("forecaster unavailable: {0}")]
    Unavailable(String),

    #[error("forecast took {elapsed_ms}ms, limit is {limit_ms}ms")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("insufficient history: need {needed} bars, have {available}")]
    InsufficientHistory { needed: usize, available: usize },
}

/// How horizon signals are blended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonConfig {
    pub weights: HorizonWeights,
    /// |weighted score| at or below this assembles to NEUTRAL.
    pub neutral_band: f64,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            weights: HorizonWeights::default(),
            neutral_band: 0.05,
        }
    }
}

impl HorizonConfig {
    pub fn with_weights(weights: HorizonWeights) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }
}

/// Oracle output for one `as_of`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub as_of: DateTime<Utc>,
    /// One per horizon, in [`Horizon::ALL`] order.
    pub signals: Vec<HorizonSignal>,
    pub regime: Regime,
    pub assembled: AssembledSignal,
}

impl Forecast {
    /// Blend per-horizon signals under `config`.
    ///
    /// - `weighted_score = Σ w · sign(direction) · confidence`, in [-1, 1].
    /// - direction is LONG/SHORT when the score clears `neutral_band`.
    /// - `consensus_score` is the weight mass whose direction matches the
    ///   assembled direction.
    /// - `confidence` is the weight-averaged confidence of those agreeing
    ///   horizons (0 for a NEUTRAL result).
    pub fn assemble(
        as_of: DateTime<Utc>,
        signals: Vec<HorizonSignal>,
        regime: Regime,
        config: &HorizonConfig,
    ) -> Forecast {
        let weights = &config.weights;
        let weighted_score: f64 = signals
            .iter()
            .map(|s| weights.get(s.horizon) * s.direction.sign() * s.confidence.clamp(0.0, 1.0))
            .sum();

        let direction = if weighted_score > config.neutral_band {
            Direction::Long
        } else if weighted_score < -config.neutral_band {
            Direction::Short
        } else {
            Direction::Neutral
        };

        let mut agree_mass = 0.0;
        let mut agree_conf = 0.0;
        for s in signals.iter().filter(|s| s.direction == direction) {
            let w = weights.get(s.horizon);
            agree_mass += w;
            agree_conf += w * s.confidence.clamp(0.0, 1.0);
        }
        let confidence = if direction == Direction::Neutral || agree_mass <= 0.0 {
            0.0
        } else {
            agree_conf / agree_mass
        };

        Forecast {
            as_of,
            signals,
            regime,
            assembled: AssembledSignal {
                direction,
                confidence,
                weighted_score,
                consensus_score: agree_mass.clamp(0.0, 1.0),
                regime,
            },
        }
    }

    /// Substitute used whenever the oracle fails or times out.
    pub fn neutral(as_of: DateTime<Utc>) -> Forecast {
        Forecast {
            as_of,
            signals: Horizon::ALL.iter().map(|&h| HorizonSignal::neutral(h)).collect(),
            regime: Regime::Unknown,
            assembled: AssembledSignal::neutral(),
        }
    }

    /// Horizon carrying the largest |strength|, if any strength is non-zero.
    pub fn dominant_horizon(&self) -> Option<Horizon> {
        self.signals
            .iter()
            .filter(|s| s.strength.abs() > 0.0)
            .max_by(|a, b| {
                a.strength
                    .abs()
                    .total_cmp(&b.strength.abs())
                    .then_with(|| b.horizon.index().cmp(&a.horizon.index()))
            })
            .map(|s| s.horizon)
    }
}

/// The forecasting oracle.
pub trait Forecaster: Send + Sync {
    fn name(&self) -> &str;

    /// Bars of history required before the first forecast.
    fn warmup_bars(&self) -> usize;

    /// Forecast as of `as_of`. `history` ends at the last bar with
    /// `timestamp <= as_of`.
    fn forecast(
        &self,
        history: &[PriceBar],
        as_of: DateTime<Utc>,
        config: &HorizonConfig,
    ) -> Result<Forecast, ForecastError>;
}

// ─── Reference implementation ───────────────────────────────────────

/// Baseline oracle: trailing return per horizon, scaled by realized volatility.
///
/// For horizon `h`, the trailing return `r` over the last `h` days is compared
/// to the volatility expected over that span, `z = r / (σ_daily · √h)`.
/// Direction follows the sign of `z` outside `dead_zone`; confidence is
/// `tanh(|z|)`. The regime is HIGH_VOLATILITY above `high_vol_annual`,
/// otherwise BULL/BEAR/SIDEWAYS by the 60-day return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailingMomentumForecaster {
    pub vol_window: usize,
    pub dead_zone: f64,
    pub high_vol_annual: f64,
    pub trend_threshold: f64,
}

impl Default for TrailingMomentumForecaster {
    fn default() -> Self {
        Self {
            vol_window: 60,
            dead_zone: 0.25,
            high_vol_annual: 1.2,
            trend_threshold: 0.05,
        }
    }
}

impl TrailingMomentumForecaster {
    fn close_days_ago(history: &[PriceBar], as_of: DateTime<Utc>, days: u32) -> Option<f64> {
        let cutoff = as_of - Duration::days(days as i64);
        let idx = history.partition_point(|b| b.timestamp <= cutoff);
        idx.checked_sub(1).map(|i| history[i].close)
    }

    fn daily_vol(&self, history: &[PriceBar]) -> f64 {
        let start = history.len().saturating_sub(self.vol_window + 1);
        let rets: Vec<f64> = history[start..]
            .windows(2)
            .filter(|w| w[0].close > 0.0)
            .map(|w| (w[1].close / w[0].close).ln())
            .collect();
        metrics::std_dev(&rets)
    }
}

impl Forecaster for TrailingMomentumForecaster {
    fn name(&self) -> &str {
        "trailing_momentum"
    }

    fn warmup_bars(&self) -> usize {
        (Horizon::D60.days() as usize + 1).max(self.vol_window + 1)
    }

    fn forecast(
        &self,
        history: &[PriceBar],
        as_of: DateTime<Utc>,
        config: &HorizonConfig,
    ) -> Result<Forecast, ForecastError> {
        if history.len() < self.warmup_bars() {
            return Err(ForecastError::InsufficientHistory {
                needed: self.warmup_bars(),
                available: history.len(),
            });
        }
        let last = history
            .last()
            .ok_or(ForecastError::InsufficientHistory { needed: self.warmup_bars(), available: 0 })?;
        if last.timestamp > as_of {
            return Err(ForecastError::Unavailable(format!(
                "history extends past as_of ({} > {})",
                last.timestamp, as_of
            )));
        }

        let vol = self.daily_vol(history);
        let mut signals = Vec::with_capacity(Horizon::ALL.len());
        let mut r60 = 0.0;
        for h in Horizon::ALL {
            let Some(then) = Self::close_days_ago(history, as_of, h.days()) else {
                signals.push(HorizonSignal::neutral(h));
                continue;
            };
            let r = if then > 0.0 { last.close / then - 1.0 } else { 0.0 };
            if h == Horizon::D60 {
                r60 = r;
            }
            let expected = vol * (h.days() as f64).sqrt();
            let z = if expected > 1e-12 { r / expected } else { 0.0 };
            let direction = if z > self.dead_zone {
                Direction::Long
            } else if z < -self.dead_zone {
                Direction::Short
            } else {
                Direction::Neutral
            };
            signals.push(HorizonSignal {
                horizon: h,
                direction,
                strength: r,
                confidence: z.abs().tanh(),
            });
        }

        let annual_vol = vol * 365f64.sqrt();
        let regime = if annual_vol > self.high_vol_annual {
            Regime::HighVolatility
        } else if r60 > self.trend_threshold {
            Regime::Bull
        } else if r60 < -self.trend_threshold {
            Regime::Bear
        } else {
            Regime::Sideways
        };

        Ok(Forecast::assemble(as_of, signals, regime, config))
    }
}
