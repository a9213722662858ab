//! Application layer: batch evaluation.

pub mod batch_wrappers;
pub mod commands;
pub mod evaluator;

pub use commands::EvalContext;
pub use evaluator::{BatchEvaluator, Evaluation, MAX_SERVERSIDE_RETRIES};
