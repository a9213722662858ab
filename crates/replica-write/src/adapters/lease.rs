//! Lease bookkeeping for a single replica.

use crate::domain::{
    BatchRequest, Lease, LeaseRequest, LeaseState, LeaseStatus, RangeDescriptor, RequestContext,
    WriteError,
};
use crate::ports::{Clock, LeaseAuthority};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{ReplicaId, Timestamp};
use std::sync::Arc;
use tracing::{debug, info};

/// Default lease duration: 6 seconds.
pub const DEFAULT_LEASE_DURATION_NANOS: u64 = 6_000_000_000;

pub struct InMemoryLeaseAuthority {
    replica: ReplicaId,
    desc: RangeDescriptor,
    clock: Arc<dyn Clock>,
    lease_duration_nanos: u64,
    lease: Mutex<Option<Lease>>,
    /// Serializes acquisitions so concurrent requests share one.
    acquiring: tokio::sync::Mutex<()>,
}

impl InMemoryLeaseAuthority {
    pub fn new(replica: ReplicaId, desc: RangeDescriptor, clock: Arc<dyn Clock>) -> Self {
        Self {
            replica,
            desc,
            clock,
            lease_duration_nanos: DEFAULT_LEASE_DURATION_NANOS,
            lease: Mutex::new(None),
            acquiring: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_lease_duration(mut self, nanos: u64) -> Self {
        self.lease_duration_nanos = nanos;
        self
    }

    /// Status of `lease` at `now` from this replica's point of view.
    pub fn status(&self, lease: &Lease, now: Timestamp) -> LeaseStatus {
        let state = if now >= lease.expiration {
            LeaseState::Expired
        } else if !lease.owned_by(self.replica) {
            LeaseState::Foreign
        } else {
            LeaseState::Valid
        };
        LeaseStatus {
            lease: lease.clone(),
            state,
            now,
        }
    }

    /// Apply a lease request that went through the log. Fails if the lease
    /// it replaces is no longer current.
    pub fn install_lease(&self, req: &LeaseRequest) -> Result<(), WriteError> {
        let mut current = self.lease.lock();
        if let Some(cur) = current.as_ref() {
            if !cur.equivalent(&req.prev_lease) {
                return Err(WriteError::LeaseRejected(format!(
                    "previous lease {} of {} does not match current lease {}",
                    req.prev_lease.sequence, req.prev_lease.replica, cur.sequence
                )));
            }
        }
        info!(
            range_id = %self.desc.range_id,
            holder = %req.lease.replica,
            sequence = req.lease.sequence,
            "installed new lease"
        );
        *current = Some(req.lease.clone());
        Ok(())
    }

    /// Build a request handing the current lease to `target`.
    pub fn transfer_request(&self, target: ReplicaId) -> Option<LeaseRequest> {
        let prev = self.lease.lock().clone()?;
        let start = self.clock.now();
        Some(LeaseRequest {
            lease: Lease {
                replica: target,
                start,
                expiration: start.add(self.lease_duration_nanos, 0),
                epoch: prev.epoch,
                sequence: prev.sequence + 1,
            },
            prev_lease: prev,
        })
    }

    fn new_lease(&self, prev: Option<&Lease>, now: Timestamp) -> Lease {
        Lease {
            replica: self.replica,
            start: now,
            expiration: now.add(self.lease_duration_nanos, 0),
            epoch: prev.map_or(1, |p| p.epoch),
            sequence: prev.map_or(1, |p| p.sequence + 1),
        }
    }

    fn not_lease_holder(&self, holder: Option<ReplicaId>) -> WriteError {
        WriteError::NotLeaseHolder {
            range_id: self.desc.range_id,
            replica: self.replica,
            lease_holder: holder,
        }
    }
}

#[async_trait]
impl LeaseAuthority for InMemoryLeaseAuthority {
    fn replica_id(&self) -> ReplicaId {
        self.replica
    }

    fn descriptor(&self) -> RangeDescriptor {
        self.desc.clone()
    }

    async fn resolve_or_acquire_lease(
        &self,
        ctx: &RequestContext,
    ) -> Result<LeaseStatus, WriteError> {
        let check = |now: Timestamp| -> Option<Result<LeaseStatus, WriteError>> {
            let lease = self.lease.lock().clone()?;
            let status = self.status(&lease, now);
            match status.state {
                LeaseState::Valid => Some(Ok(status)),
                LeaseState::Foreign => Some(Err(self.not_lease_holder(Some(lease.replica)))),
                LeaseState::Expired => None,
            }
        };
        if let Some(res) = check(self.clock.now()) {
            return res;
        }

        let _acquiring = tokio::select! {
            guard = self.acquiring.lock() => guard,
            err = ctx.done() => return Err(WriteError::AbortedBeforeProposing(err.to_string())),
        };
        let now = self.clock.now();
        if let Some(res) = check(now) {
            return res;
        }
        let mut current = self.lease.lock();
        let lease = self.new_lease(current.as_ref(), now);
        debug!(range_id = %self.desc.range_id, sequence = lease.sequence, "acquired lease");
        *current = Some(lease.clone());
        Ok(self.status(&lease, now))
    }

    fn check_can_proceed(
        &self,
        ba: &BatchRequest,
        status: Option<&LeaseStatus>,
    ) -> Result<(), WriteError> {
        if let Some(span) = ba.key_bounds() {
            if !self.desc.contains_span(&span) {
                return Err(WriteError::RangeKeyMismatch {
                    range_id: self.desc.range_id,
                    span,
                });
            }
        }
        let Some(status) = status else {
            return Ok(());
        };
        if !status.is_valid() || !status.lease.owned_by(self.replica) {
            return Err(self.not_lease_holder(Some(status.lease.replica)));
        }
        if ba.write_timestamp() >= status.lease.expiration {
            return Err(self.not_lease_holder(Some(status.lease.replica)));
        }
        Ok(())
    }

    fn current_lease(&self) -> Option<Lease> {
        self.lease.lock().clone()
    }
}
