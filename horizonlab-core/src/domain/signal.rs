//! Per-horizon forecasts and the assembled trading signal.

use serde::{Deserialize, Serialize};

/// One of the four forecast horizons blended by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Horizon {
    D7,
    D14,
    D30,
    D60,
}

impl Horizon {
    pub const ALL: [Horizon; 4] = [Horizon::D7, Horizon::D14, Horizon::D30, Horizon::D60];

    pub fn days(self) -> u32 {
        match self {
            Horizon::D7 => 7,
            Horizon::D14 => 14,
            Horizon::D30 => 30,
            Horizon::D60 => 60,
        }
    }

    /// Position of this horizon in weight vectors and usage counters.
    pub fn index(self) -> usize {
        match self {
            Horizon::D7 => 0,
            Horizon::D14 => 1,
            Horizon::D30 => 2,
            Horizon::D60 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Direction {
    /// +1 for long, -1 for short, 0 for neutral.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
            Direction::Neutral => 0.0,
        }
    }

    /// True if `self` and `other` are opposite non-neutral directions.
    pub fn opposes(self, other: Direction) -> bool {
        matches!(
            (self, other),
            (Direction::Long, Direction::Short) | (Direction::Short, Direction::Long)
        )
    }
}

/// Market regime label reported by the forecaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Bull,
    Bear,
    Sideways,
    HighVolatility,
    Unknown,
}

/// Directional forecast for one horizon at one `as_of` time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonSignal {
    pub horizon: Horizon,
    pub direction: Direction,
    /// Signed expected-return magnitude.
    pub strength: f64,
    /// In [0, 1].
    pub confidence: f64,
}

impl HorizonSignal {
    pub fn neutral(horizon: Horizon) -> Self {
        Self {
            horizon,
            direction: Direction::Neutral,
            strength: 0.0,
            confidence: 0.0,
        }
    }
}

/// The blended signal the simulator trades on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledSignal {
    pub direction: Direction,
    pub confidence: f64,
    pub weighted_score: f64,
    /// Weight mass of horizons agreeing with `direction`, in [0, 1].
    pub consensus_score: f64,
    pub regime: Regime,
}

impl AssembledSignal {
    pub fn neutral() -> Self {
        Self {
            direction: Direction::Neutral,
            confidence: 0.0,
            weighted_score: 0.0,
            consensus_score: 0.0,
            regime: Regime::Unknown,
        }
    }
}
