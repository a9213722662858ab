//! Transaction records as carried on a batch header.

use serde::{Deserialize, Serialize};
use shared_types::{Key, NodeId, Timestamp, TxnId};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Committed,
    Aborted,
}

impl TransactionStatus {
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

/// A clock reading taken from a node on behalf of a transaction. Bounds the
/// uncertainty interval for values read from that node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedTimestamp {
    pub node_id: NodeId,
    pub timestamp: Timestamp,
}

/// The subset of a transaction that is stored alongside its intents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnMeta {
    pub id: TxnId,
    pub key: Key,
    pub epoch: u32,
    pub write_timestamp: Timestamp,
}

/// A transaction's client-visible record.
///
/// `write_timestamp` and `epoch` only ever move forward. `read_timestamp`
/// never exceeds `write_timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxnId,
    /// Anchor key; the transaction record lives here.
    pub key: Key,
    pub epoch: u32,
    pub priority: i32,
    pub status: TransactionStatus,
    pub read_timestamp: Timestamp,
    pub write_timestamp: Timestamp,
    /// Upper bound of the uncertainty interval.
    pub max_timestamp: Timestamp,
    pub observed_timestamps: Vec<ObservedTimestamp>,
    /// Set when a write was pushed above a committed value.
    pub write_too_old: bool,
    /// Set once the client has observed the commit timestamp; the
    /// transaction may then no longer commit above its read timestamp.
    pub commit_timestamp_fixed: bool,
}

impl Transaction {
    /// A fresh pending transaction anchored at `key` and started at `now`.
    pub fn new(key: impl Into<Key>, now: Timestamp, max_offset_nanos: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            epoch: 0,
            priority: 0,
            status: TransactionStatus::Pending,
            read_timestamp: now,
            write_timestamp: now,
            max_timestamp: now.add(max_offset_nanos, 0),
            observed_timestamps: Vec::new(),
            write_too_old: false,
            commit_timestamp_fixed: false,
        }
    }

    pub fn meta(&self) -> TxnMeta {
        TxnMeta {
            id: self.id,
            key: self.key.clone(),
            epoch: self.epoch,
            write_timestamp: self.write_timestamp,
        }
    }

    /// Whether the write timestamp has moved above the read timestamp.
    pub fn is_pushed(&self) -> bool {
        self.write_timestamp != self.read_timestamp
    }

    /// Move the transaction to `ts` as if its reads had been refreshed up to
    /// it: the write timestamp is forwarded, the read timestamp catches up and
    /// the write-too-old condition is cleared.
    pub fn refresh(&mut self, ts: Timestamp) {
        self.write_timestamp.forward(ts);
        self.read_timestamp.forward(self.write_timestamp);
        self.write_too_old = false;
    }

    pub fn observed_timestamp(&self, node_id: NodeId) -> Option<Timestamp> {
        self.observed_timestamps
            .iter()
            .find(|o| o.node_id == node_id)
            .map(|o| o.timestamp)
    }

    /// Record a clock reading for `node_id`, keeping the earliest one seen.
    pub fn update_observed_timestamp(&mut self, node_id: NodeId, timestamp: Timestamp) {
        match self
            .observed_timestamps
            .iter_mut()
            .find(|o| o.node_id == node_id)
        {
            Some(existing) => existing.timestamp.backward(timestamp),
            None => self.observed_timestamps.push(ObservedTimestamp { node_id, timestamp }),
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id.simple().to_string();
        write!(
            f,
            "txn {} epo={} rts={} wts={} {:?}",
            &id[..8],
            self.epoch,
            self.read_timestamp,
            self.write_timestamp,
            self.status
        )
    }
}
