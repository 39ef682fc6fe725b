//! Console command policy.

pub mod evaluator;

pub use evaluator::{CommandDecision, CommandPolicy};
