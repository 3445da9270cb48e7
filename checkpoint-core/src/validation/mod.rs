//! Validation flow: scan gate, response reducers and the orchestrator.

pub mod gate;
pub mod orchestrator;
pub mod reducer;

pub use gate::{GateRefusal, ScanGate, ScanGateView, ScanId};
pub use orchestrator::{Orchestrator, OrchestratorCommand, OrchestratorEffect, Phase, TimerId};
pub use reducer::{StatusContract, ValidationOutcome, reduce_registration, reduce_validation};
