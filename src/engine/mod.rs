//! The engine: C4 (action runner), C5 (plan runner), and C6 (driver),
//! wired together in submodules matching that split.

pub mod action;
pub mod driver;
pub mod plan;

pub use driver::{Engine, EngineArgs, EngineOutcome};
pub use plan::PlanOutcome;
