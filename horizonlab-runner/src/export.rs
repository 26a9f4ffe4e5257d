//! Export — JSON and CSV artifacts.
//!
//! - **JSON**: every result type, wrapped in an envelope carrying
//!   `schema_version`, `kind` and `run_id`
//! - **CSV**: trade ledger and equity curve for external analysis tools
//!
//! Newer schema versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use horizonlab_core::domain::SimTrade;
use horizonlab_core::engine::{EquityPoint, SimResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Current artifact schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Envelope written around every JSON artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact<T> {
    pub schema_version: u32,
    /// What `result` holds, e.g. "simulation" or "certification".
    pub kind: String,
    pub run_id: String,
    pub result: T,
}

impl<T> Artifact<T> {
    pub fn new(kind: &str, run_id: &str, result: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            kind: kind.to_string(),
            run_id: run_id.to_string(),
            result,
        }
    }
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json<T: Serialize>(artifact: &Artifact<T>) -> Result<String> {
    serde_json::to_string_pretty(artifact)
        .with_context(|| format!("failed to serialize {} artifact to JSON", artifact.kind))
}

/// Deserialize an artifact, rejecting unknown schema versions.
pub fn import_json<T: DeserializeOwned>(json: &str) -> Result<Artifact<T>> {
    let artifact: Artifact<T> = serde_json::from_str(json).context("failed to deserialize artifact from JSON")?;
    if artifact.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            artifact.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(artifact)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Trade ledger as CSV.
///
/// Columns: entry_ts, exit_ts, side, entry_price, exit_price, size,
/// net_return, hold_days, exit_reason
pub fn export_trades_csv(trades: &[SimTrade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "entry_ts",
        "exit_ts",
        "side",
        "entry_price",
        "exit_price",
        "size",
        "net_return",
        "hold_days",
        "exit_reason",
    ])?;
    for t in trades {
        wtr.write_record([
            &t.entry_ts.to_rfc3339(),
            &t.exit_ts.to_rfc3339(),
            &format!("{:?}", t.side),
            &format!("{:.6}", t.entry_price),
            &format!("{:.6}", t.exit_price),
            &format!("{:.4}", t.size),
            &format!("{:.6}", t.net_return),
            &t.hold_days.to_string(),
            &format!("{:?}", t.exit_reason),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Equity curve as CSV, one row per simulator step.
pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "equity", "drawdown", "step_return"])?;
    for p in equity_curve {
        wtr.write_record([
            &p.timestamp.to_rfc3339(),
            &format!("{:.2}", p.equity),
            &format!("{:.6}", p.drawdown),
            &format!("{:.6}", p.step_return),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

fn run_dir(output_dir: &Path, run_id: &str) -> Result<PathBuf> {
    let dir = output_dir.join(run_id);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create artifact dir: {}", dir.display()))?;
    Ok(dir)
}

/// Write `{output_dir}/{run_id}/{kind}.json`. Returns the file path.
pub fn save_json<T: Serialize>(artifact: &Artifact<T>, output_dir: &Path) -> Result<PathBuf> {
    let dir = run_dir(output_dir, &artifact.run_id)?;
    let path = dir.join(format!("{}.json", artifact.kind));
    std::fs::write(&path, export_json(artifact)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Save the full artifact set for one simulation.
///
/// Creates `{output_dir}/{run_id}/` containing:
/// - `simulation.json`: the full `SimResult`
/// - `trades.csv`: trade ledger
/// - `equity.csv`: step-by-step equity curve
///
/// Returns the path to the directory.
pub fn save_simulation(result: &SimResult, run_id: &str, output_dir: &Path) -> Result<PathBuf> {
    let artifact = Artifact::new("simulation", run_id, result);
    let json_path = save_json(&artifact, output_dir)?;
    let dir = json_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| output_dir.join(run_id));

    std::fs::write(dir.join("trades.csv"), export_trades_csv(&result.trades)?)?;
    std::fs::write(dir.join("equity.csv"), export_equity_csv(&result.equity_curve)?)?;
    Ok(dir)
}

/// Load a saved artifact file. Rejects unknown schema versions.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Artifact<T>> {
    let json = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}
