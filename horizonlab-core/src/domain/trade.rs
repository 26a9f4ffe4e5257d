//! SimTrade — a closed round trip in the simulator's append-only ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::Side;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    HardKill,
    MaxHold,
    SignalFlip,
    WeakSignal,
    EndOfData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimTrade {
    pub entry_ts: DateTime<Utc>,
    pub exit_ts: DateTime<Utc>,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    /// Size-scaled return net of the full round-trip cost.
    pub net_return: f64,
    pub hold_days: i64,
    pub exit_reason: ExitReason,
}

impl SimTrade {
    pub fn is_winner(&self) -> bool {
        self.net_return > 0.0
    }
}
