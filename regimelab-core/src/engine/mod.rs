//! Position lifecycle and the simulation loop.

pub mod lifecycle;
pub mod position;
pub mod ratchet;
pub mod simulation;

pub use lifecycle::{validate_stop, Admission, LifecycleEngine, StepOutcome};
pub use position::{Position, PositionState};
pub use ratchet::RatchetState;
pub use simulation::{
    run_simulation, run_simulation_with_cancel, EquityPoint, SimulationResult, SkipReport,
};
