//! Coarse weight grid — enumerates horizon-weight vectors on a fixed step.
//!
//! Weights are enumerated in integer units of `step` (10 units at step 0.10),
//! so every vector sums to exactly one unit total and no floating-point
//! drift can creep into the grid. Each component must be at least `floor`.

use horizonlab_core::domain::{HorizonWeights, WEIGHT_EPSILON};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("grid step must divide 1.0 evenly, got {step}")]
    UnevenStep { step: f64 },
    #[error("weight floor {floor} leaves no feasible vector")]
    InfeasibleFloor { floor: f64 },
}

/// Domain constraints applied after enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConstraints {
    pub max_w7: f64,
    pub max_w60: f64,
    /// Lower bound on `w14 + w30`.
    pub min_w14_w30: f64,
}

impl Default for WeightConstraints {
    fn default() -> Self {
        Self {
            max_w7: 0.35,
            max_w60: 0.45,
            min_w14_w30: 0.35,
        }
    }
}

impl WeightConstraints {
    /// Constraints that admit every valid weight vector.
    pub fn unconstrained() -> Self {
        Self {
            max_w7: 1.0,
            max_w60: 1.0,
            min_w14_w30: 0.0,
        }
    }

    pub fn admits(&self, w: &HorizonWeights) -> bool {
        w.w7() <= self.max_w7 + WEIGHT_EPSILON
            && w.w60() <= self.max_w60 + WEIGHT_EPSILON
            && w.w14() + w.w30() + WEIGHT_EPSILON >= self.min_w14_w30
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub step: f64,
    pub floor: f64,
    pub constraints: WeightConstraints,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            step: 0.10,
            floor: 0.05,
            constraints: WeightConstraints::default(),
        }
    }
}

/// Every weight vector on the grid, before constraint filtering, in
/// lexicographic order of (w7, w14, w30, w60).
pub fn enumerate(config: &GridConfig) -> Result<Vec<HorizonWeights>, GridError> {
    if config.step.is_nan() || config.step <= 0.0 {
        return Err(GridError::UnevenStep { step: config.step });
    }
    let units_f = 1.0 / config.step;
    let units = units_f.round();
    if (units_f - units).abs() > 1e-6 || units < 4.0 {
        return Err(GridError::UnevenStep { step: config.step });
    }
    let units = units as u32;
    let min_units = (config.floor / config.step - 1e-9).ceil().max(0.0) as u32;
    if min_units * 4 > units {
        return Err(GridError::InfeasibleFloor {
            floor: config.floor,
        });
    }

    let unit = 1.0 / units as f64;
    let mut out = Vec::new();
    for a in min_units..=units {
        for b in min_units..=units.saturating_sub(a) {
            for c in min_units..=units.saturating_sub(a + b) {
                let used = a + b + c;
                if used > units || units - used < min_units {
                    continue;
                }
                let d = units - used;
                let raw = [a, b, c, d].map(|u| u as f64 * unit);
                // All components are >= floor and sum to 1, so this cannot fail.
                if let Ok(w) = HorizonWeights::from_array(raw) {
                    out.push(w);
                }
            }
        }
    }
    Ok(out)
}

/// Grid vectors that satisfy the domain constraints.
pub fn candidates(config: &GridConfig) -> Result<Vec<HorizonWeights>, GridError> {
    Ok(enumerate(config)?
        .into_iter()
        .filter(|w| config.constraints.admits(w))
        .collect())
}
