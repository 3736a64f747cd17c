pub mod correlation;
pub mod covenant;
pub mod error;
pub mod rng;
pub mod simulation;
pub mod types;

pub use covenant::scenario::calculate_scenario_impact;
pub use error::CovenantRiskError;
pub use simulation::engine::{
    run_monte_carlo_simulation, run_monte_carlo_simulation_cancellable,
};
pub use types::*;

/// Standard result type for all covenant-risk operations
pub type CovenantRiskResult<T> = Result<T, CovenantRiskError>;
