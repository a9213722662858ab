//! Server-side retries of batches that failed with a retriable timestamp
//! conflict.

use super::one_phase_commit::can_forward_commit_timestamp_without_refresh;
use crate::domain::{BatchRequest, WriteError};
use shared_types::Timestamp;

/// Decide whether `ba` can be re-evaluated at a higher timestamp after
/// failing with `err`, and if so move it there.
///
/// Transactional batches qualify only if they end the transaction and the
/// commit timestamp may move without a refresh. Nothing is retried past the
/// EndTxn deadline.
pub fn can_do_serverside_retry(err: &WriteError, ba: &mut BatchRequest) -> bool {
    let mut deadline = None;
    if let Some(txn) = ba.txn() {
        let Some(et) = ba.end_txn() else {
            return false;
        };
        if !can_forward_commit_timestamp_without_refresh(txn, et) {
            return false;
        }
        deadline = et.deadline;
    }

    let new_timestamp = match err {
        WriteError::WriteTooOld {
            actual_timestamp, ..
        } => *actual_timestamp,
        WriteError::TransactionRetry { txn, .. } => {
            if ba.txn().is_none() {
                return false;
            }
            txn.write_timestamp
        }
        _ => return false,
    };

    if deadline.is_some_and(|d| d <= new_timestamp) {
        return false;
    }
    bump_batch_timestamp(ba, new_timestamp);
    true
}

/// Move the batch to `ts`. A transaction is refreshed to `ts` and the batch
/// follows its read timestamp. A batch never moves backwards.
pub fn bump_batch_timestamp(ba: &mut BatchRequest, ts: Timestamp) {
    match ba.header.txn.as_mut() {
        Some(txn) => {
            txn.refresh(ts);
            ba.header.timestamp = txn.read_timestamp;
        }
        None => {
            ba.header.timestamp.forward(ts);
        }
    }
}
