//! Side effects of evaluation that travel with a proposal.
//!
//! Some effects are replicated with the command (the new lease, gossip
//! triggers, the logical op log) and some are handled locally by the
//! proposer once the command applies (intent cleanup).

use super::errors::WriteError;
use super::lease::Lease;
use super::transaction::{Transaction, TxnMeta};
use serde::{Deserialize, Serialize};
use shared_types::{Key, Span, Timestamp, TxnId};

/// A provisional value of another transaction, found during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub span: Span,
    pub txn: TxnMeta,
}

/// A finalized transaction with intents this range could not resolve in the
/// same batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndTxnIntents {
    pub txn: Transaction,
    pub external_spans: Vec<Span>,
}

/// A logical description of one MVCC mutation, for change feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    WriteValue {
        key: Key,
        timestamp: Timestamp,
        value: Option<Vec<u8>>,
    },
    WriteIntent {
        txn_id: TxnId,
        key: Key,
        timestamp: Timestamp,
    },
    CommitIntent {
        txn_id: TxnId,
        key: Key,
        timestamp: Timestamp,
    },
    AbortIntent {
        txn_id: TxnId,
        key: Key,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalOpLog {
    pub ops: Vec<LogicalOp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideEffects {
    /// Intents of other transactions observed while evaluating.
    pub encountered_intents: Vec<Intent>,
    pub end_txns: Vec<EndTxnIntents>,
    pub logical_op_log: Option<LogicalOpLog>,
    pub new_lease: Option<Lease>,
    pub gossip_system_config: bool,
    pub gossip_node_liveness: Option<Span>,
}

impl SideEffects {
    /// Fold `other` into `self`. Fails if both carry a value for a field that
    /// holds at most one.
    pub fn merge_and_destroy(&mut self, other: SideEffects) -> Result<(), WriteError> {
        let SideEffects {
            encountered_intents,
            end_txns,
            logical_op_log,
            new_lease,
            gossip_system_config,
            gossip_node_liveness,
        } = other;

        self.encountered_intents.extend(encountered_intents);
        self.end_txns.extend(end_txns);

        if let Some(theirs) = logical_op_log {
            match &mut self.logical_op_log {
                Some(mine) => mine.ops.extend(theirs.ops),
                None => self.logical_op_log = Some(theirs),
            }
        }

        if new_lease.is_some() {
            if self.new_lease.is_some() {
                return Err(WriteError::SideEffectConflict("new lease".into()));
            }
            self.new_lease = new_lease;
        }
        self.gossip_system_config |= gossip_system_config;
        if gossip_node_liveness.is_some() {
            if self.gossip_node_liveness.is_some() {
                return Err(WriteError::SideEffectConflict("node liveness span".into()));
            }
            self.gossip_node_liveness = gossip_node_liveness;
        }
        Ok(())
    }

    /// Whether anything here must be replicated with the command.
    pub fn has_replicated_effects(&self) -> bool {
        self.new_lease.is_some()
            || self.gossip_system_config
            || self.gossip_node_liveness.is_some()
            || self
                .logical_op_log
                .as_ref()
                .is_some_and(|log| !log.ops.is_empty())
    }
}
