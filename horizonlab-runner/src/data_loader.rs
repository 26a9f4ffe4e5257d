//! Bar loading for the runner.
//!
//! Two sources:
//! 1. CSV file with `timestamp,open,high,low,close` columns (`date` is
//!    accepted as an alias; RFC 3339 timestamps or plain `YYYY-MM-DD` dates)
//! 2. Synthetic random walk, deterministic per (symbol, seed)
//!
//! Either way the bars go through a `MemoryPriceStore`, which enforces strict
//! time ordering, and come back with a BLAKE3 dataset hash for provenance.
//! Synthetic data is tagged so reports can flag it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use horizonlab_core::domain::PriceBar;
use horizonlab_core::store::{MemoryPriceStore, PriceStore, StoreError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} line {line}: {message}")]
    BadRow {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("no bars loaded for '{symbol}'")]
    Empty { symbol: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    Csv {
        path: PathBuf,
    },
    Synthetic {
        start: NaiveDate,
        end: NaiveDate,
        #[serde(default)]
        seed: u64,
    },
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Synthetic {
            start: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or_default(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub symbol: String,
    pub source: DataSource,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            symbol: "SYN".to_string(),
            source: DataSource::default(),
        }
    }
}

/// Loaded bars plus provenance.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub symbol: String,
    pub bars: Vec<PriceBar>,
    /// BLAKE3 over every bar, for fingerprinting runs.
    pub dataset_hash: String,
    pub synthetic: bool,
}

// ─── Loading ─────────────────────────────────────────────────────────

/// Load the configured series into a price store.
pub fn load_store(config: &DataConfig) -> Result<MemoryPriceStore, LoadError> {
    let bars = match &config.source {
        DataSource::Csv { path } => read_csv(path, &config.symbol)?,
        DataSource::Synthetic { start, end, seed } => {
            generate_synthetic_bars(&config.symbol, *start, *end, *seed)
        }
    };
    if bars.is_empty() {
        return Err(LoadError::Empty {
            symbol: config.symbol.clone(),
        });
    }
    let mut store = MemoryPriceStore::new();
    store.insert(config.symbol.clone(), bars)?;
    Ok(store)
}

/// Load the configured series in full.
pub fn load_bars(config: &DataConfig) -> Result<LoadedData, LoadError> {
    let store = load_store(config)?;
    let bars = store.all(&config.symbol)?.to_vec();
    debug!(symbol = %config.symbol, bars = bars.len(), "bars loaded");
    Ok(LoadedData {
        symbol: config.symbol.clone(),
        dataset_hash: compute_dataset_hash(&bars),
        synthetic: matches!(config.source, DataSource::Synthetic { .. }),
        bars,
    })
}

/// Load only `[from, to]` plus `lookback` earlier bars.
pub fn load_range(
    config: &DataConfig,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    lookback: usize,
) -> Result<Vec<PriceBar>, LoadError> {
    let store = load_store(config)?;
    Ok(store.range(&config.symbol, from, to, lookback)?)
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "date")]
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

fn read_csv(path: &Path, symbol: &str) -> Result<Vec<PriceBar>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let mut bars = Vec::new();
    for record in reader.deserialize::<CsvRow>() {
        let row = record.map_err(csv_err)?;
        // Header is line 1.
        let line = bars.len() as u64 + 2;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::BadRow {
            path: path.to_path_buf(),
            line,
            message: format!("unparseable timestamp '{}'", row.timestamp),
        })?;
        let bar = PriceBar {
            symbol: symbol.to_string(),
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
        };
        if !bar.is_void() && !bar.is_sane() {
            warn!(%symbol, line, "bar fails OHLC sanity check");
        }
        bars.push(bar);
    }
    Ok(bars)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// BLAKE3 over symbol, timestamps and OHLC values in series order.
pub fn compute_dataset_hash(bars: &[PriceBar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(bar.symbol.as_bytes());
        hasher.update(&bar.timestamp.timestamp().to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Daily random walk from 100.0, one bar per calendar day.
///
/// Seeded from BLAKE3(symbol, seed), so a given pair always produces the
/// same series.
pub fn generate_synthetic_bars(symbol: &str, start: NaiveDate, end: NaiveDate, seed: u64) -> Vec<PriceBar> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    hasher.update(&seed.to_le_bytes());
    let mut rng = StdRng::from_seed(*hasher.finalize().as_bytes());

    let mut bars = Vec::new();
    let mut price = 100.0_f64;
    let mut current = start;
    while current <= end {
        let Some(midnight) = current.and_hms_opt(0, 0, 0) else {
            break;
        };
        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        bars.push(PriceBar {
            symbol: symbol.to_string(),
            timestamp: Utc.from_utc_datetime(&midnight),
            open,
            high,
            low,
            close,
        });
        price = close;
        current += Duration::days(1);
    }
    bars
}
