//! Price store capability.
//!
//! Range queries over `[from, to]` plus a number of lookback bars before
//! `from`, enough to satisfy a forecaster's warm-up window.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{is_strictly_ordered, PriceBar};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("bars for {symbol} are not strictly time-ordered")]
    Unordered { symbol: String },

    #[error("no bars for {symbol} in [{from}, {to}]")]
    EmptyRange {
        symbol: String,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

pub trait PriceStore: Send + Sync {
    fn symbols(&self) -> Vec<String>;

    /// Bars with `from <= timestamp <= to`, preceded by up to `lookback` earlier bars.
    fn range(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        lookback: usize,
    ) -> Result<Vec<PriceBar>, StoreError>;
}

/// In-memory store, one ordered series per symbol.
#[derive(Debug, Clone, Default)]
pub struct MemoryPriceStore {
    series: BTreeMap<String, Vec<PriceBar>>,
}

impl MemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, bars: Vec<PriceBar>) -> Result<(), StoreError> {
        let symbol = symbol.into();
        if !is_strictly_ordered(&bars) {
            return Err(StoreError::Unordered { symbol });
        }
        self.series.insert(symbol, bars);
        Ok(())
    }

    pub fn all(&self, symbol: &str) -> Result<&[PriceBar], StoreError> {
        self.series
            .get(symbol)
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::UnknownSymbol(symbol.to_string()))
    }
}

impl PriceStore for MemoryPriceStore {
    fn symbols(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    fn range(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        lookback: usize,
    ) -> Result<Vec<PriceBar>, StoreError> {
        let bars = self.all(symbol)?;
        let lo = bars.partition_point(|b| b.timestamp < from);
        let hi = bars.partition_point(|b| b.timestamp <= to);
        if lo >= hi {
            return Err(StoreError::EmptyRange {
                symbol: symbol.to_string(),
                from,
                to,
            });
        }
        Ok(bars[lo.saturating_sub(lookback)..hi].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bars(n: i64) -> Vec<PriceBar> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| PriceBar {
                symbol: "ETH".into(),
                timestamp: t0 + Duration::days(i),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
            })
            .collect()
    }

    #[test]
    fn range_includes_lookback() {
        let mut store = MemoryPriceStore::new();
        let b = bars(30);
        store.insert("ETH", b.clone()).unwrap();
        let out = store.range("ETH", b[10].timestamp, b[19].timestamp, 5).unwrap();
        assert_eq!(out.len(), 15);
        assert_eq!(out[0].timestamp, b[5].timestamp);
        assert_eq!(out.last().unwrap().timestamp, b[19].timestamp);
    }

    #[test]
    fn lookback_saturates_at_series_start() {
        let mut store = MemoryPriceStore::new();
        let b = bars(30);
        store.insert("ETH", b.clone()).unwrap();
        let out = store.range("ETH", b[2].timestamp, b[4].timestamp, 100).unwrap();
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn unknown_symbol_and_empty_range() {
        let mut store = MemoryPriceStore::new();
        let b = bars(3);
        store.insert("ETH", b.clone()).unwrap();
        assert!(matches!(
            store.range("BTC", b[0].timestamp, b[2].timestamp, 0),
            Err(StoreError::UnknownSymbol(_))
        ));
        let later = b[2].timestamp + Duration::days(10);
        assert!(matches!(
            store.range("ETH", later, later + Duration::days(1), 0),
            Err(StoreError::EmptyRange { .. })
        ));
    }

    #[test]
    fn rejects_unordered_series() {
        let mut b = bars(3);
        b.swap(0, 2);
        assert!(MemoryPriceStore::new().insert("ETH", b).is_err());
    }
}
