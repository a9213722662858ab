//! Error types for the write path.

use super::effects::Intent;
use super::transaction::Transaction;
use serde::{Deserialize, Serialize};
use shared_types::{Key, RangeId, ReplicaId, Span, Timestamp, TxnId};
use std::fmt;
use thiserror::Error;

/// Why a transaction must retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionRetryReason {
    RetryWriteTooOld,
    RetrySerializable,
    RetryCommitDeadlineExceeded,
}

impl fmt::Display for TransactionRetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RetryWriteTooOld => "RETRY_WRITE_TOO_OLD",
            Self::RetrySerializable => "RETRY_SERIALIZABLE",
            Self::RetryCommitDeadlineExceeded => "RETRY_COMMIT_DEADLINE_EXCEEDED",
        };
        f.write_str(s)
    }
}

/// Coarse classification used by callers to decide what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before anything was proposed; safe to redirect or retry.
    Rejection,
    /// Must be retried by the transaction's coordinator.
    Retriable,
    /// The write may or may not have applied.
    Ambiguous,
    /// Conflict with another transaction's intents.
    Conflict,
    Other,
}

#[derive(Debug, Clone, Error)]
pub enum WriteError {
    #[error("replica {replica} not lease holder for {range_id}; current lease holder: {lease_holder:?}")]
    NotLeaseHolder {
        range_id: RangeId,
        replica: ReplicaId,
        lease_holder: Option<ReplicaId>,
    },

    #[error("key range {span:?} outside of bounds of range {range_id}")]
    RangeKeyMismatch { range_id: RangeId, span: Span },

    #[error("aborted before proposing: {0}")]
    AbortedBeforeProposing(String),

    #[error("WriteTooOldError: write at timestamp {timestamp} too old; wrote at {actual_timestamp}")]
    WriteTooOld {
        timestamp: Timestamp,
        actual_timestamp: Timestamp,
    },

    #[error("TransactionRetryError: retry txn ({reason} - {message}): {txn}")]
    TransactionRetry {
        reason: TransactionRetryReason,
        message: String,
        txn: Box<Transaction>,
    },

    #[error("conflicting intents on {}", fmt_intent_keys(.intents))]
    WriteIntent { intents: Vec<Intent> },

    #[error("TransactionAbortedError: txn {txn_id} already aborted")]
    TransactionAborted { txn_id: TxnId },

    #[error("TransactionStatusError: txn {txn_id} already committed")]
    TransactionCommitted { txn_id: TxnId },

    #[error("result is ambiguous ({0})")]
    AmbiguousResult(String),

    #[error("failed to run commit trigger: {0}")]
    CommitTrigger(String),

    #[error("conflicting side effects: {0} set twice")]
    SideEffectConflict(String),

    #[error("{access} access to {key} not declared")]
    SpanAccessViolation { access: String, key: Key },

    #[error("value at {key} is not an integer")]
    InvalidValue { key: Key },

    #[error("integer overflow incrementing {key}")]
    IntegerOverflow { key: Key },

    #[error("{method} requires a transaction")]
    MissingTransaction { method: &'static str },

    #[error("lease rejected: {0}")]
    LeaseRejected(String),

    #[error("proposal rejected: {0}")]
    ProposalRejected(String),

    #[error("intent resolver at capacity ({limit} tasks)")]
    TaskLimitExceeded { limit: usize },

    #[error("storage error: {0}")]
    Storage(String),
}

fn fmt_intent_keys(intents: &[Intent]) -> String {
    intents
        .iter()
        .map(|i| format!("{:?}", i.span))
        .collect::<Vec<_>>()
        .join(", ")
}

impl WriteError {
    pub fn retry(reason: TransactionRetryReason, message: impl Into<String>, txn: &Transaction) -> Self {
        WriteError::TransactionRetry {
            reason,
            message: message.into(),
            txn: Box::new(txn.clone()),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            WriteError::NotLeaseHolder { .. }
            | WriteError::RangeKeyMismatch { .. }
            | WriteError::AbortedBeforeProposing(_)
            | WriteError::LeaseRejected(_)
            | WriteError::ProposalRejected(_) => ErrorCategory::Rejection,
            WriteError::WriteTooOld { .. }
            | WriteError::TransactionRetry { .. }
            | WriteError::TransactionAborted { .. } => ErrorCategory::Retriable,
            WriteError::AmbiguousResult(_) => ErrorCategory::Ambiguous,
            WriteError::WriteIntent { .. } => ErrorCategory::Conflict,
            _ => ErrorCategory::Other,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        self.category() == ErrorCategory::Ambiguous
    }

    pub fn is_retriable_by_client(&self) -> bool {
        self.category() == ErrorCategory::Retriable
    }

    /// Intents carried by a conflict error.
    pub fn intents(&self) -> &[Intent] {
        match self {
            WriteError::WriteIntent { intents } => intents,
            _ => &[],
        }
    }
}
