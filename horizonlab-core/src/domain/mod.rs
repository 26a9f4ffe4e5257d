//! Domain types for HorizonLab.

pub mod bar;
pub mod position;
pub mod signal;
pub mod trade;
pub mod weights;

pub use bar::{is_strictly_ordered, PriceBar};
pub use position::{OpenPosition, Position, Side};
pub use signal::{AssembledSignal, Direction, Horizon, HorizonSignal, Regime};
pub use trade::{ExitReason, SimTrade};
pub use weights::{HorizonWeights, WeightsError, WEIGHT_EPSILON, WEIGHT_FLOOR};

/// Symbol type alias
pub type Symbol = String;
