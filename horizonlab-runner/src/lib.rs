//! HorizonLab Runner — validation, optimization and certification.
//!
//! This crate builds on `horizonlab-core` to provide:
//! - Monte Carlo block-bootstrap validation of trade ledgers
//! - Candidate evaluation (simulate, then validate) with panic isolation
//! - Horizon-weight grid enumeration, scoring and penalties
//! - Coarse grid search + stochastic refine, under a search budget
//! - Rolling walk-forward validation
//! - Certification (rolling AND Monte Carlo) and A/B certification
//! - TOML run configuration, data loading, JSON/CSV export

pub mod ab_certify;
pub mod certify;
pub mod config;
pub mod data_loader;
pub mod evaluator;
pub mod export;
pub mod grid;
pub mod monte_carlo;
pub mod optimizer;
pub mod rolling;
pub mod scoring;

pub use ab_certify::{ab_certify, AbDeltas, AbResult, AbThresholds, AbToggle, Recommendation};
pub use certify::{CertificationService, CertifyError, CertifyResult, Period, Verdict};
pub use config::{AbConfig, ConfigError, RunConfig, RunId};
pub use data_loader::{load_bars, DataConfig, DataSource, LoadError, LoadedData};
pub use evaluator::{CandidateError, Evaluation, Evaluator};
pub use grid::{GridConfig, GridError, WeightConstraints};
pub use monte_carlo::{validate, McConfig, McThresholds, MonteCarloResult};
pub use optimizer::{optimize, OptimizeConfig, OptimizeReport, RefineConfig, SearchBudget};
pub use rolling::{
    DegradationFlag, RollingConfig, RollingError, RollingGates, RollingSummary, RollingValidator,
    WalkForwardSplits,
};
pub use scoring::{CandidateScore, PenaltyConfig, ScoreWeights, Scorer};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn result_types_are_send_sync() {
        assert_send::<MonteCarloResult>();
        assert_sync::<MonteCarloResult>();
        assert_send::<Evaluation>();
        assert_sync::<Evaluation>();
        assert_send::<CandidateScore>();
        assert_sync::<CandidateScore>();
        assert_send::<OptimizeReport>();
        assert_sync::<OptimizeReport>();
        assert_send::<RollingSummary>();
        assert_sync::<RollingSummary>();
        assert_send::<CertifyResult>();
        assert_sync::<CertifyResult>();
        assert_send::<AbResult>();
        assert_sync::<AbResult>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<McConfig>();
        assert_sync::<McConfig>();
        assert_send::<OptimizeConfig>();
        assert_sync::<OptimizeConfig>();
        assert_send::<SearchBudget>();
        assert_sync::<SearchBudget>();
        assert_send::<RollingConfig>();
        assert_sync::<RollingConfig>();
        assert_send::<WalkForwardSplits>();
        assert_sync::<WalkForwardSplits>();
    }

    #[test]
    fn error_types_are_send_sync() {
        assert_send::<CandidateError>();
        assert_sync::<CandidateError>();
        assert_send::<RollingError>();
        assert_sync::<RollingError>();
        assert_send::<CertifyError>();
        assert_sync::<CertifyError>();
        assert_send::<LoadError>();
        assert_sync::<LoadError>();
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
    }
}
