//! PriceBar — the fundamental market data unit.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// OHLC bar for a single symbol at a single timestamp.
///
/// Bars are externally supplied and immutable. A series handed to the
/// simulator must be strictly ordered by `timestamp`; gaps are tolerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriceBar {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Returns true if any OHLC field is non-finite or not positive.
    ///
    /// Void bars carry no usable price; the simulator skips them.
    pub fn is_void(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .any(|p| !p.is_finite() || *p <= 0.0)
    }

    /// Basic OHLC sanity check: high >= low, high >= open/close, positive prices.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}

/// Returns true if `bars` is strictly increasing in time.
pub fn is_strictly_ordered(bars: &[PriceBar]) -> bool {
    bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}
