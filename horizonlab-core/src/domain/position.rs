//! Position state machine: FLAT is both the initial and the only re-enterable state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signal::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn from_direction(direction: Direction) -> Option<Side> {
        match direction {
            Direction::Long => Some(Side::Long),
            Direction::Short => Some(Side::Short),
            Direction::Neutral => None,
        }
    }

    pub fn as_direction(self) -> Direction {
        match self {
            Side::Long => Direction::Long,
            Side::Short => Direction::Short,
        }
    }
}

/// An open LONG or SHORT holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: Side,
    pub entry_price: f64,
    pub entry_timestamp: DateTime<Utc>,
    /// Exposure as a multiple of equity.
    pub size: f64,
    /// Size-scaled return since entry, before costs.
    pub unrealized_pnl: f64,
    pub hold_days: i64,
}

impl OpenPosition {
    /// Refresh unrealized PnL and holding time against a new mark.
    pub fn mark(&mut self, price: f64, now: DateTime<Utc>) {
        self.unrealized_pnl = self.side.sign() * (price / self.entry_price - 1.0) * self.size;
        self.hold_days = (now - self.entry_timestamp).num_days();
    }

    /// Price at which a fractional stop-loss triggers.
    pub fn stop_price(&self, stop_fraction: f64) -> f64 {
        match self.side {
            Side::Long => self.entry_price * (1.0 - stop_fraction),
            Side::Short => self.entry_price * (1.0 + stop_fraction),
        }
    }

    /// True if a step whose range spans [low, high] breached the stop.
    pub fn stop_breached(&self, low: f64, high: f64, stop_fraction: f64) -> bool {
        let stop = self.stop_price(stop_fraction);
        match self.side {
            Side::Long => low <= stop,
            Side::Short => high >= stop,
        }
    }
}

/// At most one position is open per simulator run; the enum makes a second
/// concurrent position unrepresentable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Position {
    #[default]
    Flat,
    Open(OpenPosition),
}

impl Position {
    pub fn is_flat(&self) -> bool {
        matches!(self, Position::Flat)
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            Position::Flat => None,
            Position::Open(p) => Some(p.side),
        }
    }

    pub fn as_open(&self) -> Option<&OpenPosition> {
        match self {
            Position::Flat => None,
            Position::Open(p) => Some(p),
        }
    }

    pub fn as_open_mut(&mut self) -> Option<&mut OpenPosition> {
        match self {
            Position::Flat => None,
            Position::Open(p) => Some(p),
        }
    }

    /// Take the open position out, leaving FLAT behind.
    pub fn close(&mut self) -> Option<OpenPosition> {
        match std::mem::take(self) {
            Position::Flat => None,
            Position::Open(p) => Some(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn long_at(price: f64) -> OpenPosition {
        OpenPosition {
            side: Side::Long,
            entry_price: price,
            entry_timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            size: 1.5,
            unrealized_pnl: 0.0,
            hold_days: 0,
        }
    }

    #[test]
    fn mark_updates_pnl_and_hold() {
        let mut p = long_at(100.0);
        let later = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();
        p.mark(110.0, later);
        assert!((p.unrealized_pnl - 0.15).abs() < 1e-12);
        assert_eq!(p.hold_days, 10);
    }

    #[test]
    fn short_stop_is_above_entry() {
        let mut p = long_at(100.0);
        p.side = Side::Short;
        assert!((p.stop_price(0.15) - 115.0).abs() < 1e-12);
        assert!(p.stop_breached(99.0, 116.0, 0.15));
        assert!(!p.stop_breached(99.0, 114.0, 0.15));
    }

    #[test]
    fn long_stop_uses_low() {
        let p = long_at(100.0);
        assert!(p.stop_breached(84.0, 101.0, 0.15));
        assert!(!p.stop_breached(86.0, 101.0, 0.15));
    }

    #[test]
    fn close_returns_to_flat() {
        let mut pos = Position::Open(long_at(100.0));
        assert!(!pos.is_flat());
        let closed = pos.close();
        assert!(closed.is_some());
        assert!(pos.is_flat());
        assert!(pos.close().is_none());
    }
}
