//! Proposals and their results.

use super::effects::{EndTxnIntents, Intent, LogicalOpLog, SideEffects};
use super::errors::WriteError;
use super::lease::Lease;
use super::response::BatchResponse;
use super::stats::MvccStats;
use crate::ports::EngineBatch;
use shared_types::{CommandId, LeaseAppliedIndex, RangeId};
use std::fmt;
use tokio::sync::oneshot;

/// The product of evaluating a batch that must be replicated.
pub struct EvaluatedWrite {
    pub batch: Box<dyn EngineBatch>,
    pub stats: MvccStats,
    pub response: BatchResponse,
    pub effects: SideEffects,
}

/// A command submitted to the consensus log.
pub struct Proposal {
    pub command_id: CommandId,
    pub range_id: RangeId,
    /// The lease the command was evaluated under. For lease requests, the
    /// lease they replace.
    pub lease: Lease,
    pub is_lease_request: bool,
    pub summary: String,
    pub write: EvaluatedWrite,
}

impl fmt::Debug for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proposal")
            .field("command_id", &self.command_id)
            .field("range_id", &self.range_id)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

/// Final outcome of a proposal plus the local work it left for the
/// proposer.
#[derive(Debug)]
pub struct ProposalResult {
    pub outcome: Result<BatchResponse, WriteError>,
    pub encountered_intents: Vec<Intent>,
    pub end_txns: Vec<EndTxnIntents>,
    pub logical_op_log: Option<LogicalOpLog>,
}

impl ProposalResult {
    pub fn from_error(error: WriteError) -> Self {
        let encountered_intents = error.intents().to_vec();
        Self {
            outcome: Err(error),
            encountered_intents,
            end_txns: Vec::new(),
            logical_op_log: None,
        }
    }

    pub fn from_response(response: BatchResponse, effects: SideEffects) -> Self {
        Self {
            outcome: Ok(response),
            encountered_intents: effects.encountered_intents,
            end_txns: effects.end_txns,
            logical_op_log: effects.logical_op_log,
        }
    }
}

/// Withdraws the proposer's interest in a proposal's result.
pub type AbandonFn = Box<dyn FnOnce() + Send>;

/// What a proposer holds while waiting for its command.
pub struct ProposalHandle {
    pub completion: oneshot::Receiver<ProposalResult>,
    pub abandon: AbandonFn,
    /// Zero if the command was not sequenced.
    pub max_lease_index: LeaseAppliedIndex,
}

impl ProposalHandle {
    /// A handle whose result is already known; nothing was replicated.
    pub fn completed(result: ProposalResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self {
            completion: rx,
            abandon: Box::new(|| {}),
            max_lease_index: 0,
        }
    }
}

impl fmt::Debug for ProposalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProposalHandle")
            .field("max_lease_index", &self.max_lease_index)
            .finish_non_exhaustive()
    }
}

/// A proposal that never reached the log.
#[derive(Debug)]
pub struct ProposalError {
    pub error: WriteError,
    pub max_lease_index: LeaseAppliedIndex,
}

impl ProposalError {
    pub fn new(error: WriteError) -> Self {
        Self {
            error,
            max_lease_index: 0,
        }
    }
}

impl From<WriteError> for ProposalError {
    fn from(error: WriteError) -> Self {
        ProposalError::new(error)
    }
}
