//! # Identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a range (a contiguous slice of the key space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RangeId(pub u64);

impl fmt::Display for RangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Identifier of a node (process) in the cluster.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

/// Identifier of one replica of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaId {
    pub node_id: NodeId,
    pub replica: u32,
}

impl ReplicaId {
    pub fn new(node_id: u32, replica: u32) -> Self {
        Self {
            node_id: NodeId(node_id),
            replica,
        }
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{},s{}", self.node_id.0, self.replica)
    }
}

/// Transaction identifier.
pub type TxnId = Uuid;

/// Unique identifier of a proposed command, used to match applied log
/// entries to waiting proposers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(pub Uuid);

impl CommandId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

/// Position of an applied command within the range's lease-scoped sequence.
///
/// Zero means "no index assigned".
pub type LeaseAppliedIndex = u64;

/// Epoch of the lease under which a command was proposed.
pub type LeaseEpoch = u64;
