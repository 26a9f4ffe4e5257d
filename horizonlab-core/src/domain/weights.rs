//! HorizonWeights — the blend of the four forecast horizons.
//!
//! Invariant: every component is >= `WEIGHT_FLOOR` and the components sum to 1.
//! Fields are private and every constructor and mutation renormalizes, so a
//! vector violating the invariant cannot be built.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::signal::Horizon;

/// Minimum weight any horizon may carry.
pub const WEIGHT_FLOOR: f64 = 0.05;

/// Tolerance used when comparing weight sums and constraint bounds.
pub const WEIGHT_EPSILON: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum WeightsError {
    #[error("weight component {index} is not finite")]
    NonFinite { index: usize },
    #[error("weight component {index} is negative ({value})")]
    Negative { index: usize, value: f64 },
    #[error("weights have zero total mass")]
    ZeroMass,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWeights", into = "RawWeights")]
pub struct HorizonWeights {
    w: [f64; 4],
}

/// Serialized form: `{ "w7": .., "w14": .., "w30": .., "w60": .. }`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawWeights {
    w7: f64,
    w14: f64,
    w30: f64,
    w60: f64,
}

impl TryFrom<RawWeights> for HorizonWeights {
    type Error = WeightsError;

    fn try_from(raw: RawWeights) -> Result<Self, Self::Error> {
        HorizonWeights::new(raw.w7, raw.w14, raw.w30, raw.w60)
    }
}

impl From<HorizonWeights> for RawWeights {
    fn from(w: HorizonWeights) -> Self {
        RawWeights {
            w7: w.w[0],
            w14: w.w[1],
            w30: w.w[2],
            w60: w.w[3],
        }
    }
}

impl HorizonWeights {
    /// Build from raw (not necessarily normalized) components.
    pub fn new(w7: f64, w14: f64, w30: f64, w60: f64) -> Result<Self, WeightsError> {
        Self::from_array([w7, w14, w30, w60])
    }

    pub fn from_array(raw: [f64; 4]) -> Result<Self, WeightsError> {
        for (index, &value) in raw.iter().enumerate() {
            if !value.is_finite() {
                return Err(WeightsError::NonFinite { index });
            }
            if value < 0.0 {
                return Err(WeightsError::Negative { index, value });
            }
        }
        if raw.iter().sum::<f64>() <= 0.0 {
            return Err(WeightsError::ZeroMass);
        }
        Ok(Self {
            w: project_onto_floor(raw),
        })
    }

    pub fn equal() -> Self {
        Self { w: [0.25; 4] }
    }

    pub fn w7(&self) -> f64 {
        self.w[0]
    }

    pub fn w14(&self) -> f64 {
        self.w[1]
    }

    pub fn w30(&self) -> f64 {
        self.w[2]
    }

    pub fn w60(&self) -> f64 {
        self.w[3]
    }

    pub fn get(&self, horizon: Horizon) -> f64 {
        self.w[horizon.index()]
    }

    pub fn as_array(&self) -> [f64; 4] {
        self.w
    }

    pub fn max_weight(&self) -> f64 {
        self.w.iter().copied().fold(f64::MIN, f64::max)
    }

    /// Shift one component by `delta` and renormalize.
    ///
    /// A component pushed below the floor is pinned back to the floor and the
    /// remaining mass is redistributed proportionally.
    pub fn perturb(&self, horizon: Horizon, delta: f64) -> Self {
        let mut raw = self.w;
        let i = horizon.index();
        raw[i] = (raw[i] + delta).max(0.0);
        Self {
            w: project_onto_floor(raw),
        }
    }

    /// Integer key (1e-9 resolution) for deterministic tie-breaking and dedup.
    pub fn key(&self) -> [i64; 4] {
        self.w.map(|v| (v * 1e9).round() as i64)
    }
}

impl Default for HorizonWeights {
    fn default() -> Self {
        Self::equal()
    }
}

impl std::fmt::Display for HorizonWeights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "w7={:.3} w14={:.3} w30={:.3} w60={:.3}",
            self.w[0], self.w[1], self.w[2], self.w[3]
        )
    }
}

/// Normalize a non-negative vector with positive mass so that it sums to 1
/// and every component is at least `WEIGHT_FLOOR`.
///
/// Components that would fall below the floor are pinned to it; the free
/// components share the remaining mass in proportion to their raw values.
/// Converges in at most four passes because each pass pins at least one more
/// component or terminates.
fn project_onto_floor(raw: [f64; 4]) -> [f64; 4] {
    let mut pinned = [false; 4];
    loop {
        let pinned_count = pinned.iter().filter(|&&p| p).count();
        let free_count = 4 - pinned_count;
        if free_count == 0 {
            return [1.0 / 4.0; 4];
        }
        let free_mass = 1.0 - WEIGHT_FLOOR * pinned_count as f64;
        let free_sum: f64 = (0..4).filter(|&i| !pinned[i]).map(|i| raw[i]).sum();

        let mut out = [WEIGHT_FLOOR; 4];
        let mut newly_pinned = false;
        for i in 0..4 {
            if pinned[i] {
                continue;
            }
            let v = if free_sum > 0.0 {
                raw[i] / free_sum * free_mass
            } else {
                free_mass / free_count as f64
            };
            if v < WEIGHT_FLOOR {
                pinned[i] = true;
                newly_pinned = true;
            } else {
                out[i] = v;
            }
        }
        if !newly_pinned {
            return out;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariant(w: &HorizonWeights) {
        let sum: f64 = w.as_array().iter().sum();
        assert!((sum - 1.0).abs() < WEIGHT_EPSILON, "sum = {sum}");
        for v in w.as_array() {
            assert!(v >= WEIGHT_FLOOR, "component {v} below floor");
        }
    }

    #[test]
    fn normalizes_unscaled_input() {
        let w = HorizonWeights::new(2.0, 3.0, 3.0, 2.0).unwrap();
        assert!((w.w7() - 0.2).abs() < 1e-12);
        assert!((w.w14() - 0.3).abs() < 1e-12);
        assert_invariant(&w);
    }

    #[test]
    fn pins_small_components_to_floor() {
        let w = HorizonWeights::new(0.0, 0.01, 0.5, 0.49).unwrap();
        assert_eq!(w.w7(), WEIGHT_FLOOR);
        assert_eq!(w.w14(), WEIGHT_FLOOR);
        assert_invariant(&w);
    }

    #[test]
    fn pinning_cascades_over_several_passes() {
        // w14 only drops under the floor once w30 and w60 are pinned.
        let w = HorizonWeights::new(0.9, 0.052, 0.048, 0.0).unwrap();
        assert!((w.w7() - 0.85).abs() < 1e-12);
        assert_eq!(w.w14(), WEIGHT_FLOOR);
        assert_eq!(w.w30(), WEIGHT_FLOOR);
        assert_eq!(w.w60(), WEIGHT_FLOOR);
        assert_invariant(&w);

        let w = HorizonWeights::new(0.9, 0.06, 0.04, 0.0).unwrap();
        assert!((w.w14() - 0.05625).abs() < 1e-12);
        assert_invariant(&w);
    }

    #[test]
    fn rejects_negative_and_zero_mass() {
        assert!(matches!(
            HorizonWeights::new(-0.1, 0.5, 0.3, 0.3),
            Err(WeightsError::Negative { index: 0, .. })
        ));
        assert_eq!(
            HorizonWeights::new(0.0, 0.0, 0.0, 0.0),
            Err(WeightsError::ZeroMass)
        );
        assert!(matches!(
            HorizonWeights::new(f64::NAN, 0.5, 0.3, 0.3),
            Err(WeightsError::NonFinite { index: 0 })
        ));
    }

    #[test]
    fn perturb_keeps_invariant() {
        let w = HorizonWeights::new(0.06, 0.34, 0.3, 0.3).unwrap();
        let down = w.perturb(Horizon::D7, -0.03);
        assert_invariant(&down);
        assert_eq!(down.w7(), WEIGHT_FLOOR);

        let up = w.perturb(Horizon::D60, 0.03);
        assert_invariant(&up);
        assert!(up.w60() > w.w60());
    }

    #[test]
    fn deserialize_validates_and_normalizes() {
        let w: HorizonWeights =
            serde_json::from_str(r#"{"w7":1.0,"w14":1.0,"w30":1.0,"w60":1.0}"#).unwrap();
        assert_eq!(w, HorizonWeights::equal());

        let bad = serde_json::from_str::<HorizonWeights>(r#"{"w7":-1.0,"w14":1.0,"w30":1.0,"w60":1.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn serializes_named_fields() {
        let json = serde_json::to_string(&HorizonWeights::equal()).unwrap();
        assert!(json.contains("\"w7\":0.25"));
        assert!(json.contains("\"w60\":0.25"));
    }
}
