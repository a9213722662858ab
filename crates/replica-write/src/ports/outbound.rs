//! Driven ports (outbound dependencies)
//!
//! Everything the write path needs from the rest of the replica: the lease,
//! the closed timestamp tracker, the timestamp cache, storage, the
//! consensus log and the intent resolver.

use crate::domain::{
    BatchRequest, EndTxnIntents, Intent, LatchGuard, Lease, LeaseStatus, MvccStats, Proposal,
    ProposalError, ProposalHandle, RangeDescriptor, RequestContext, Transaction, WriteError,
};
use async_trait::async_trait;
use shared_types::{Key, LeaseAppliedIndex, LeaseEpoch, RangeId, ReplicaId, Span, Timestamp};
use std::fmt;

/// Source of hybrid logical clock readings.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Maximum tolerated clock offset between nodes, in nanoseconds.
    fn max_offset_nanos(&self) -> u64 {
        0
    }
}

/// Lease state of the local replica.
#[async_trait]
pub trait LeaseAuthority: Send + Sync {
    fn replica_id(&self) -> ReplicaId;

    fn descriptor(&self) -> RangeDescriptor;

    /// Return the current lease if this replica holds it, acquiring it if
    /// nobody does.
    async fn resolve_or_acquire_lease(&self, ctx: &RequestContext)
        -> Result<LeaseStatus, WriteError>;

    /// Reject batches this replica may not serve. `status` is `None` for
    /// batches exempt from the leaseholder check.
    fn check_can_proceed(
        &self,
        ba: &BatchRequest,
        status: Option<&LeaseStatus>,
    ) -> Result<(), WriteError>;

    /// The lease currently in effect, if any.
    fn current_lease(&self) -> Option<Lease>;
}

/// Releases a closed timestamp tracking token exactly once. Dropping it
/// untracks with zero values.
pub struct Untracker {
    untrack: Option<Box<dyn FnOnce(LeaseEpoch, RangeId, LeaseAppliedIndex) + Send>>,
}

impl Untracker {
    pub fn new(untrack: impl FnOnce(LeaseEpoch, RangeId, LeaseAppliedIndex) + Send + 'static) -> Self {
        Self {
            untrack: Some(Box::new(untrack)),
        }
    }

    pub fn untrack(mut self, epoch: LeaseEpoch, range_id: RangeId, lai: LeaseAppliedIndex) {
        if let Some(untrack) = self.untrack.take() {
            untrack(epoch, range_id, lai);
        }
    }
}

impl Drop for Untracker {
    fn drop(&mut self) {
        if let Some(untrack) = self.untrack.take() {
            untrack(0, RangeId(0), 0);
        }
    }
}

impl fmt::Debug for Untracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Untracker")
            .field("pending", &self.untrack.is_some())
            .finish()
    }
}

/// Registers in-flight writes so timestamps are not closed under them.
pub trait ClosedTimestampTracker: Send + Sync {
    /// Returns the minimum timestamp the tracked write may use.
    fn track(&self) -> (Timestamp, Untracker);
}

/// Read timestamps of recently served reads.
pub trait TimestampCache: Send + Sync {
    /// Forward the batch's write timestamp above earlier reads of the keys
    /// it writes and to at least `min_ts`. Returns whether anything moved.
    fn apply_and_bump(&self, ba: &mut BatchRequest, min_ts: Timestamp) -> bool;
}

/// Read/write access to a pending storage batch. Nothing is visible to
/// other readers until [`EngineBatch::commit`].
pub trait EngineBatch: Send {
    /// Value of `key` visible at `ts`; `txn` sees its own intents.
    fn mvcc_get(
        &self,
        key: &Key,
        ts: Timestamp,
        txn: Option<&Transaction>,
    ) -> Result<Option<Vec<u8>>, WriteError>;

    /// Write `value` (a deletion if `None`) at `ts`, as an intent when `txn`
    /// is set.
    fn mvcc_put(
        &mut self,
        stats: &mut MvccStats,
        key: &Key,
        ts: Timestamp,
        value: Option<Vec<u8>>,
        txn: Option<&Transaction>,
    ) -> Result<(), WriteError>;

    /// Resolve the intents of `txn` in `span` according to its status.
    /// Returns the keys resolved.
    fn mvcc_resolve_intents(
        &mut self,
        stats: &mut MvccStats,
        span: &Span,
        txn: &Transaction,
    ) -> Result<Vec<Key>, WriteError>;

    fn get_txn_record(&self, txn: &Transaction) -> Result<Option<Transaction>, WriteError>;

    fn put_txn_record(&mut self, txn: &Transaction) -> Result<(), WriteError>;

    fn delete_txn_record(&mut self, txn: &Transaction) -> Result<(), WriteError>;

    /// Whether the batch holds no mutations.
    fn is_empty(&self) -> bool;

    fn commit(self: Box<Self>) -> Result<(), WriteError>;

    /// Discard the batch.
    fn close(self: Box<Self>);
}

pub trait StorageEngine: Send + Sync {
    fn new_batch(&self) -> Box<dyn EngineBatch>;
}

/// The range's replicated log.
#[async_trait]
pub trait ConsensusLog: Send + Sync {
    /// Submit `proposal`. On success the log owns `guard` and releases it
    /// once the command applies or is rejected.
    async fn propose(
        &self,
        proposal: Proposal,
        guard: LatchGuard,
    ) -> Result<ProposalHandle, ProposalError>;
}

/// Background cleanup of intents.
///
/// With `allow_sync` set, a resolver at capacity runs the work inline
/// rather than failing.
#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn cleanup_intents_async(
        &self,
        intents: Vec<Intent>,
        allow_sync: bool,
    ) -> Result<(), WriteError>;

    async fn cleanup_txn_intents_async(
        &self,
        range_id: RangeId,
        end_txns: Vec<EndTxnIntents>,
        allow_sync: bool,
    ) -> Result<(), WriteError>;
}
