//! Invariants of the write path.
//!
//! A violated invariant means replica state can no longer be trusted, so
//! the process halts instead of returning an error.

use super::request::BatchRequest;
use super::response::BatchResponse;
use shared_types::{LeaseAppliedIndex, Timestamp};
use std::fmt;

/// Log and halt.
#[track_caller]
pub fn invariant_violation(msg: impl fmt::Display) -> ! {
    tracing::error!(%msg, "invariant violated");
    panic!("invariant violated: {msg}");
}

/// Timestamps only move forward.
pub fn invariant_timestamp_not_regressed(before: Timestamp, after: Timestamp) -> bool {
    after >= before
}

/// A proposal that failed was never sequenced.
pub fn invariant_failed_proposal_unsequenced(max_lease_index: LeaseAppliedIndex) -> bool {
    max_lease_index == 0
}

/// A transactional batch whose timestamp was moved answers with the moved
/// transaction.
pub fn invariant_bumped_response_carries_txn(ba: &BatchRequest, br: &BatchResponse) -> bool {
    ba.header.txn.is_none() || br.txn.is_some()
}

/// A one-phase commit starts from a batch whose timestamp equals the
/// transaction's write timestamp.
pub fn invariant_one_phase_commit_timestamps_aligned(ba: &BatchRequest) -> bool {
    ba.header
        .txn
        .as_ref()
        .map_or(true, |txn| txn.write_timestamp == ba.header.timestamp)
}
