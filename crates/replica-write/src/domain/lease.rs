//! Range leases and the range descriptor.

use serde::{Deserialize, Serialize};
use shared_types::{Key, LeaseEpoch, RangeId, ReplicaId, Span, Timestamp};

/// A time-bounded grant to one replica to serve and propose for a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub replica: ReplicaId,
    pub start: Timestamp,
    pub expiration: Timestamp,
    pub epoch: LeaseEpoch,
    /// Incremented each time the lease changes hands or is re-acquired.
    pub sequence: u64,
}

impl Lease {
    pub fn owned_by(&self, replica: ReplicaId) -> bool {
        self.replica == replica
    }

    /// Two leases are equivalent when they describe the same grant, ignoring
    /// extensions of the expiration.
    pub fn equivalent(&self, other: &Lease) -> bool {
        self.replica == other.replica
            && self.epoch == other.epoch
            && self.sequence == other.sequence
            && self.start == other.start
    }

    pub fn covers(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts < self.expiration
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseState {
    Valid,
    Expired,
    /// Held by another replica.
    Foreign,
}

/// A lease as evaluated at a particular clock reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseStatus {
    pub lease: Lease,
    pub state: LeaseState,
    pub now: Timestamp,
}

impl LeaseStatus {
    pub fn is_valid(&self) -> bool {
        self.state == LeaseState::Valid
    }
}

/// The key bounds and identity of the range a replica serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDescriptor {
    pub range_id: RangeId,
    pub start_key: Key,
    pub end_key: Key,
}

impl RangeDescriptor {
    pub fn new(range_id: RangeId, start_key: impl Into<Key>, end_key: impl Into<Key>) -> Self {
        Self {
            range_id,
            start_key: start_key.into(),
            end_key: end_key.into(),
        }
    }

    pub fn span(&self) -> Span {
        Span::range(self.start_key.clone(), self.end_key.clone())
    }

    pub fn contains_span(&self, span: &Span) -> bool {
        self.span().contains(span)
    }
}
