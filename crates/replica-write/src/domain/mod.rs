//! Domain layer for the replica write path
//!
//! - request/response: batches and their results
//! - transaction, lease: records carried on and around a batch
//! - effects, stats: what evaluation produces besides the response
//! - proposal: what travels through the consensus log
//! - context, latch: cancellation, shutdown and latch ownership

mod context;
mod effects;
mod errors;
pub mod invariants;
mod latch;
mod lease;
mod proposal;
mod request;
mod response;
mod spans;
mod stats;
mod transaction;

pub use context::*;
pub use effects::*;
pub use errors::*;
pub use latch::*;
pub use lease::*;
pub use proposal::*;
pub use request::*;
pub use response::*;
pub use spans::*;
pub use stats::*;
pub use transaction::*;
