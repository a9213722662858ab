//! # Shared Types Crate
//!
//! Primitive value types used across the replicated write path.
//!
//! - **Timestamps**: [`Timestamp`], a hybrid logical clock reading that only
//!   ever moves forward through [`Timestamp::forward`].
//! - **Keys**: [`Key`] and [`Span`], half-open key intervals used for latches,
//!   range bounds and intent bookkeeping.
//! - **Identifiers**: ranges, nodes, replicas, transactions and commands.

pub mod ids;
pub mod keys;
pub mod timestamp;

pub use ids::*;
pub use keys::*;
pub use timestamp::Timestamp;
