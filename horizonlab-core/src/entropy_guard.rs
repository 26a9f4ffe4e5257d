//! Entropy guard — shrinks exposure when horizons disagree or one horizon
//! dominates the signal.
//!
//! Disagreement is the Shannon entropy of the confidence-weighted direction
//! mix {LONG, SHORT, NEUTRAL}, normalized by ln 3 and smoothed with an EMA
//! whose half-life is given in steps. Dominance is the share of total
//! |strength| carried by the single strongest horizon.
//!
//! The returned scale is in [0, 1], non-increasing in both smoothed entropy
//! and dominance, and exactly 1.0 when the guard is disabled.

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, HorizonSignal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyGuardConfig {
    pub enabled: bool,
    /// Smoothed entropy above this starts shrinking exposure.
    pub warn_entropy: f64,
    /// Smoothed entropy at or above this pins the scale to `hard_scale`.
    pub hard_entropy: f64,
    pub half_life_steps: f64,
    pub hard_scale: f64,
    /// Dominance share above this starts shrinking exposure.
    pub dominance_threshold: f64,
    /// Scale reached when one horizon carries all the strength.
    pub dominance_floor_scale: f64,
}

impl Default for EntropyGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warn_entropy: 0.55,
            hard_entropy: 0.85,
            half_life_steps: 3.0,
            hard_scale: 0.25,
            dominance_threshold: 0.70,
            dominance_floor_scale: 0.50,
        }
    }
}

impl EntropyGuardConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.warn_entropy) || !(0.0..=1.0).contains(&self.hard_entropy) {
            return Err("entropy thresholds must be in [0, 1]".into());
        }
        if self.warn_entropy >= self.hard_entropy {
            return Err(format!(
                "warn_entropy {} must be below hard_entropy {}",
                self.warn_entropy, self.hard_entropy
            ));
        }
        if !(0.0..=1.0).contains(&self.hard_scale)
            || !(0.0..=1.0).contains(&self.dominance_floor_scale)
        {
            return Err("guard scales must be in [0, 1]".into());
        }
        if !(0.0..1.0).contains(&self.dominance_threshold) {
            return Err("dominance_threshold must be in [0, 1)".into());
        }
        if self.half_life_steps <= 0.0 {
            return Err("half_life_steps must be positive".into());
        }
        Ok(())
    }

    fn alpha(&self) -> f64 {
        1.0 - 0.5_f64.powf(1.0 / self.half_life_steps)
    }
}

/// EMA state; one per simulator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntropyGuardState {
    pub smoothed: Option<f64>,
    pub evaluations: u64,
}

impl EntropyGuardState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardReason {
    None,
    Warn,
    Hard,
    Dominance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuardDecision {
    /// This step's normalized entropy, before smoothing.
    pub entropy_raw: f64,
    /// Smoothed normalized entropy.
    pub entropy_norm: f64,
    pub dominance: f64,
    pub scale: f64,
    pub reason: GuardReason,
}

/// Normalized Shannon entropy of the confidence-weighted direction mix.
///
/// No confidence mass at all means the horizons say nothing: 1.0.
pub fn direction_entropy(signals: &[HorizonSignal]) -> f64 {
    let mut mass = [0.0_f64; 3];
    for s in signals {
        let slot = match s.direction {
            Direction::Long => 0,
            Direction::Short => 1,
            Direction::Neutral => 2,
        };
        mass[slot] += s.confidence.clamp(0.0, 1.0);
    }
    let total: f64 = mass.iter().sum();
    if total <= 0.0 {
        return 1.0;
    }
    let h: f64 = mass
        .iter()
        .filter(|&&m| m > 0.0)
        .map(|&m| {
            let p = m / total;
            -p * p.ln()
        })
        .sum();
    (h / 3f64.ln()).clamp(0.0, 1.0)
}

/// Share of total |strength| held by the strongest horizon. 0.0 without strength.
pub fn dominance_share(signals: &[HorizonSignal]) -> f64 {
    let total: f64 = signals.iter().map(|s| s.strength.abs()).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let max = signals.iter().map(|s| s.strength.abs()).fold(0.0, f64::max);
    max / total
}

/// Linear ramp from 1.0 at `start` down to `floor` at `end`.
fn ramp(x: f64, start: f64, end: f64, floor: f64) -> f64 {
    if x <= start {
        1.0
    } else if x >= end {
        floor
    } else {
        1.0 - (1.0 - floor) * (x - start) / (end - start)
    }
}

/// Evaluate the guard for one step, advancing the EMA in `state`.
pub fn eval(
    signals: &[HorizonSignal],
    config: &EntropyGuardConfig,
    state: &mut EntropyGuardState,
) -> GuardDecision {
    let entropy_raw = direction_entropy(signals);
    let smoothed = match state.smoothed {
        None => entropy_raw,
        Some(prev) => prev + config.alpha() * (entropy_raw - prev),
    };
    state.smoothed = Some(smoothed);
    state.evaluations += 1;

    let dominance = dominance_share(signals);

    if !config.enabled {
        return GuardDecision {
            entropy_raw,
            entropy_norm: smoothed,
            dominance,
            scale: 1.0,
            reason: GuardReason::None,
        };
    }

    let entropy_scale = ramp(
        smoothed,
        config.warn_entropy,
        config.hard_entropy,
        config.hard_scale,
    );
    let dominance_scale = ramp(
        dominance,
        config.dominance_threshold,
        1.0,
        config.dominance_floor_scale,
    );

    let reason = if dominance_scale < entropy_scale {
        GuardReason::Dominance
    } else if smoothed >= config.hard_entropy {
        GuardReason::Hard
    } else if smoothed > config.warn_entropy {
        GuardReason::Warn
    } else {
        GuardReason::None
    };

    GuardDecision {
        entropy_raw,
        entropy_norm: smoothed,
        dominance,
        scale: entropy_scale.min(dominance_scale).clamp(0.0, 1.0),
        reason,
    }
}
