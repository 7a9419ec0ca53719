//! Developer tooling: stepper inspector and sub-step history.
//!
//! # Invariants
//! - Tools only read stepper state; they never advance or mutate the world.

pub mod history;
pub mod inspector;

pub use history::SubstepHistory;
pub use inspector::{BodyInfo, StepperInspector, StepperSummary};
