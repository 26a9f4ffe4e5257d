//! Run configuration, loaded from TOML.
//!
//! Every section is optional and falls back to its defaults, so an empty
//! file is a valid config: synthetic data, equal weights, default risk,
//! guard, Monte Carlo, grid, refine and rolling settings.

use std::path::{Path, PathBuf};

use horizonlab_core::engine::SimConfig;
use horizonlab_core::oracle::TrailingMomentumForecaster;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ab_certify::{AbThresholds, AbToggle};
use crate::data_loader::DataConfig;
use crate::monte_carlo::McConfig;
use crate::optimizer::{OptimizeConfig, SearchBudget};
use crate::rolling::RollingConfig;

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("config serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbConfig {
    pub toggle: AbToggle,
    pub thresholds: AbThresholds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub data: DataConfig,
    pub forecaster: TrailingMomentumForecaster,
    /// Base simulator config. Its `start`/`end` double as the certification
    /// period and its weights as the vector to simulate/validate/certify.
    pub sim: SimConfig,
    pub monte_carlo: McConfig,
    pub optimize: OptimizeConfig,
    pub budget: SearchBudget,
    pub rolling: RollingConfig,
    pub ab: AbConfig,
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sim
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.monte_carlo.block_sizes.iter().any(|&b| b == 0) {
            return Err(ConfigError::Invalid("monte_carlo.block_sizes must be >= 1".into()));
        }
        if self.optimize.refine.delta <= 0.0 || self.optimize.refine.delta.is_nan() {
            return Err(ConfigError::Invalid("optimize.refine.delta must be positive".into()));
        }
        Ok(())
    }

    /// Computes a deterministic hash ID for this configuration.
    ///
    /// Two runs with identical configs get the same RunId.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}
