//! One-phase commit eligibility and commit-time retry conditions.

use crate::domain::{BatchRequest, EndTxnRequest, Transaction, TransactionRetryReason};
use shared_types::Timestamp;

/// Whether the commit timestamp of `txn` may move above its read timestamp
/// without re-validating its reads.
pub fn can_forward_commit_timestamp_without_refresh(txn: &Transaction, et: &EndTxnRequest) -> bool {
    !txn.commit_timestamp_fixed && et.can_commit_at_higher_timestamp
}

/// Whether committing at `commit_ts` would violate the EndTxn deadline.
pub fn is_end_txn_exceeding_deadline(commit_ts: Timestamp, et: &EndTxnRequest) -> bool {
    et.deadline.is_some_and(|deadline| deadline <= commit_ts)
}

/// The retry a committing EndTxn must return, if any, with a detail
/// message.
pub fn is_end_txn_triggering_retry_error(
    txn: &Transaction,
    et: &EndTxnRequest,
) -> Option<(TransactionRetryReason, String)> {
    let mut reason = if txn.write_too_old {
        Some(TransactionRetryReason::RetryWriteTooOld)
    } else if txn.is_pushed() && !can_forward_commit_timestamp_without_refresh(txn, et) {
        Some(TransactionRetryReason::RetrySerializable)
    } else {
        None
    };

    if reason.is_some() && can_forward_commit_timestamp_without_refresh(txn, et) {
        reason = None;
    }

    if reason.is_none() && is_end_txn_exceeding_deadline(txn.write_timestamp, et) {
        let deadline = et.deadline.unwrap_or_default();
        return Some((
            TransactionRetryReason::RetryCommitDeadlineExceeded,
            format!(
                "txn timestamp pushed too much; deadline exceeded ({} >= {})",
                txn.write_timestamp, deadline
            ),
        ));
    }
    reason.map(|r| (r, String::new()))
}

/// A batch is one-phase-commit eligible when it carries every write of its
/// transaction, ends with an EndTxn that would not trigger a retry, and the
/// transaction is in its first epoch (or demands the fast path).
pub fn is_one_phase_commit(ba: &BatchRequest) -> bool {
    let Some(txn) = ba.txn() else {
        return false;
    };
    if !ba.is_complete_transaction() {
        return false;
    }
    let Some(et) = ba.end_txn() else {
        return false;
    };
    if is_end_txn_triggering_retry_error(txn, et).is_some() {
        return false;
    }
    // Earlier epochs may have left intents that the multi-step commit must
    // clean up. A transaction that always required the fast path cannot
    // have.
    txn.epoch == 0 || et.require_one_phase_commit
}

/// Move the read timestamp of a transaction up to its write timestamp when
/// that cannot invalidate anything: the batch commits the transaction in
/// one go and the client allows the commit timestamp to move.
pub fn maybe_bump_read_timestamp_to_write_timestamp(ba: &mut BatchRequest) -> bool {
    let Some(txn) = ba.header.txn.as_ref() else {
        return false;
    };
    if !txn.is_pushed() || !ba.is_complete_transaction() {
        return false;
    }
    let Some(et) = ba.end_txn() else {
        return false;
    };
    if !can_forward_commit_timestamp_without_refresh(txn, et)
        || is_end_txn_exceeding_deadline(txn.write_timestamp, et)
    {
        return false;
    }
    let write_ts = txn.write_timestamp;
    super::server_side_retry::bump_batch_timestamp(ba, write_ts);
    true
}
