//! Cost and risk parameters.
//!
//! Static constants of the trading model, kept as serde structs with `Default`
//! so they can be overridden from a run config without changing code.

use serde::{Deserialize, Serialize};

use crate::domain::ExitReason;

/// Transaction cost model: commission plus slippage, both per side in basis points.
///
/// Costs scale with position size. Half of the round trip is charged on entry
/// and half on exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    pub commission_bps: f64,
    pub slippage_bps: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            commission_bps: 10.0,
            slippage_bps: 5.0,
        }
    }
}

impl CostModel {
    pub fn new(commission_bps: f64, slippage_bps: f64) -> Self {
        Self {
            commission_bps,
            slippage_bps,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Full round-trip cost as a fraction of notional.
    pub fn round_trip(&self) -> f64 {
        2.0 * (self.commission_bps + self.slippage_bps) / 10_000.0
    }

    /// One side of the round trip, for `size` units of exposure.
    pub fn half_cost(&self, size: f64) -> f64 {
        0.5 * self.round_trip() * size
    }
}

/// Cooldown lengths in days, per exit type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cooldowns {
    pub stop_loss_days: i64,
    pub hard_kill_days: i64,
    pub max_hold_days: i64,
    pub signal_flip_days: i64,
    pub weak_signal_days: i64,
}

impl Default for Cooldowns {
    fn default() -> Self {
        Self {
            stop_loss_days: 14,
            hard_kill_days: 14,
            max_hold_days: 7,
            signal_flip_days: 7,
            weak_signal_days: 10,
        }
    }
}

impl Cooldowns {
    pub fn for_exit(&self, reason: ExitReason) -> i64 {
        match reason {
            ExitReason::StopLoss => self.stop_loss_days,
            ExitReason::HardKill => self.hard_kill_days,
            ExitReason::MaxHold => self.max_hold_days,
            ExitReason::SignalFlip => self.signal_flip_days,
            ExitReason::WeakSignal => self.weak_signal_days,
            ExitReason::EndOfData => 0,
        }
    }
}

/// Drawdown thresholds, hold-time bounds, stop-loss and entry/exit gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParams {
    /// Below this drawdown exposure is unscaled.
    pub soft_drawdown: f64,
    /// At or above this drawdown exposure is zero and open positions are liquidated.
    pub hard_drawdown: f64,
    /// Fraction of entry price that triggers the position-level stop.
    pub stop_loss_fraction: f64,
    pub min_hold_days: i64,
    pub max_hold_days: i64,
    /// Entry requires assembled confidence strictly above this.
    pub entry_confidence: f64,
    /// Entry requires consensus at or above this.
    pub entry_min_consensus: f64,
    /// Weak-signal exit: confidence below this...
    pub exit_confidence_floor: f64,
    /// ...and consensus below this.
    pub exit_consensus_floor: f64,
    pub consensus_boost: f64,
    /// Boost applies when consensus is strictly above this.
    pub consensus_boost_threshold: f64,
    pub max_size: f64,
    /// Entries are skipped when the size would be below this.
    pub min_size: f64,
    /// Entries are skipped when the drawdown multiplier is at or below this.
    pub min_dd_multiplier: f64,
    pub cooldowns: Cooldowns,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            soft_drawdown: 0.20,
            hard_drawdown: 0.40,
            stop_loss_fraction: 0.15,
            min_hold_days: 14,
            max_hold_days: 90,
            entry_confidence: 0.55,
            entry_min_consensus: 0.5,
            exit_confidence_floor: 0.35,
            exit_consensus_floor: 0.4,
            consensus_boost: 1.2,
            consensus_boost_threshold: 0.75,
            max_size: 2.0,
            min_size: 0.01,
            min_dd_multiplier: 0.01,
            cooldowns: Cooldowns::default(),
        }
    }
}

impl RiskParams {
    /// Checks that the thresholds are ordered and in range.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0 <= self.soft_drawdown && self.soft_drawdown < self.hard_drawdown) {
            return Err(format!(
                "soft_drawdown {} must be in [0, hard_drawdown {})",
                self.soft_drawdown, self.hard_drawdown
            ));
        }
        if self.hard_drawdown > 1.0 {
            return Err(format!("hard_drawdown {} exceeds 1.0", self.hard_drawdown));
        }
        if !(0.0 < self.stop_loss_fraction && self.stop_loss_fraction < 1.0) {
            return Err(format!(
                "stop_loss_fraction {} must be in (0, 1)",
                self.stop_loss_fraction
            ));
        }
        if self.min_hold_days > self.max_hold_days {
            return Err(format!(
                "min_hold_days {} exceeds max_hold_days {}",
                self.min_hold_days, self.max_hold_days
            ));
        }
        if self.max_size <= 0.0 {
            return Err("max_size must be positive".into());
        }
        Ok(())
    }

    pub fn dd_multiplier(&self, drawdown: f64) -> f64 {
        dd_multiplier(drawdown, self.soft_drawdown, self.hard_drawdown)
    }
}

/// Drawdown-aware exposure multiplier.
///
/// 1.0 below `soft`, 0.0 at or above `hard`, and in between a convex decay
/// `0.15 + 0.85 * (1 - x^1.5)` with `x = (dd - soft) / (hard - soft)`.
/// Non-increasing in `drawdown` over the whole range.
pub fn dd_multiplier(drawdown: f64, soft: f64, hard: f64) -> f64 {
    if drawdown >= hard {
        return 0.0;
    }
    if drawdown < soft || hard <= soft {
        return 1.0;
    }
    let x = ((drawdown - soft) / (hard - soft)).clamp(0.0, 1.0);
    0.15 + 0.85 * (1.0 - x.powf(1.5))
}
