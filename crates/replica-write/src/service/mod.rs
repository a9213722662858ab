//! Replica Write Service - executes write batches end to end
//!
//! # Flow
//! 1. Resolve the lease (or use the previous lease of a lease request)
//! 2. Check the batch against the lease and range bounds
//! 3. Track the write with the closed timestamp tracker
//! 4. Forward the write timestamp past earlier reads
//! 5. Evaluate and propose
//! 6. Wait for application, cancellation or shutdown

use crate::algorithms::limit_txn_max_timestamp;
use crate::application::{BatchEvaluator, EvalContext, Evaluation};
use crate::config::WriteConfig;
use crate::domain::invariants::{
    invariant_bumped_response_carries_txn, invariant_failed_proposal_unsequenced,
    invariant_timestamp_not_regressed, invariant_violation,
};
use crate::domain::{
    BatchRequest, BatchResponse, EndTxnIntents, EvaluatedWrite, Intent, LatchGuard, Lease,
    Proposal, ProposalError, ProposalHandle, ProposalResult, RequestContext, ShouldQuiesce,
    SpanSet, WriteError,
};
use crate::metrics;
use crate::ports::{
    ClosedTimestampTracker, ConsensusLog, IntentResolver, LeaseAuthority, StorageEngine,
    TimestampCache, WriteBatchApi,
};
use async_trait::async_trait;
use shared_types::{CommandId, RangeId};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};


/// Dependencies for ReplicaWriteService
pub struct WriteDependencies {
    pub lease_authority: Arc<dyn LeaseAuthority>,
    pub closed_ts: Arc<dyn ClosedTimestampTracker>,
    pub ts_cache: Arc<dyn TimestampCache>,
    pub engine: Arc<dyn StorageEngine>,
    pub consensus: Arc<dyn ConsensusLog>,
    pub intent_resolver: Arc<dyn IntentResolver>,
    pub should_quiesce: ShouldQuiesce,
    pub config: WriteConfig,
}

/// The write path of one replica.
pub struct ReplicaWriteService {
    lease_authority: Arc<dyn LeaseAuthority>,
    closed_ts: Arc<dyn ClosedTimestampTracker>,
    ts_cache: Arc<dyn TimestampCache>,
    consensus: Arc<dyn ConsensusLog>,
    intent_resolver: Arc<dyn IntentResolver>,
    should_quiesce: ShouldQuiesce,
    evaluator: BatchEvaluator,
    config: WriteConfig,
    /// Commands of this replica currently waiting past the slow threshold.
    slow_proposals: AtomicI64,
}

impl ReplicaWriteService {
    pub fn new(deps: WriteDependencies) -> Self {
        Self {
            evaluator: BatchEvaluator::new(deps.engine, &deps.config),
            lease_authority: deps.lease_authority,
            closed_ts: deps.closed_ts,
            ts_cache: deps.ts_cache,
            consensus: deps.consensus,
            intent_resolver: deps.intent_resolver,
            should_quiesce: deps.should_quiesce,
            config: deps.config,
            slow_proposals: AtomicI64::new(0),
        }
    }

    pub fn config(&self) -> &WriteConfig {
        &self.config
    }

    pub fn slow_proposals(&self) -> i64 {
        self.slow_proposals.load(Ordering::Relaxed)
    }

    /// Evaluate the batch and hand the result to the consensus log.
    ///
    /// A batch that fails evaluation, or whose evaluation changed nothing,
    /// is completed locally: its latches are released here and the returned
    /// handle already holds the result.
    async fn evaluate_and_propose(
        &self,
        lease: &Lease,
        ba: &mut BatchRequest,
        spans: &SpanSet,
        guard: &mut LatchGuard,
    ) -> Result<ProposalHandle, ProposalError> {
        let desc = self.lease_authority.descriptor();
        let rec = EvalContext {
            desc: &desc,
            spans,
        };
        let Evaluation {
            batch,
            stats,
            effects,
            outcome,
        } = self.evaluator.evaluate_write_batch(&rec, ba);

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                debug!(%err, "evaluation failed; completing locally");
                batch.close();
                guard.release();
                return Ok(ProposalHandle::completed(ProposalResult::from_error(err)));
            }
        };

        let is_lease_request = ba.is_lease_request();
        if !is_lease_request
            && batch.is_empty()
            && stats.is_zero()
            && !effects.has_replicated_effects()
        {
            trace!("nothing to replicate; completing locally");
            batch.close();
            guard.release();
            return Ok(ProposalHandle::completed(ProposalResult::from_response(
                response, effects,
            )));
        }

        let proposal = Proposal {
            command_id: CommandId::random(),
            range_id: ba.header.range_id,
            lease: lease.clone(),
            is_lease_request,
            summary: ba.summary(),
            write: EvaluatedWrite {
                batch,
                stats,
                response,
                effects,
            },
        };
        trace!(command_id = %proposal.command_id, batch = %proposal.summary, "proposing command");
        self.consensus.propose(proposal, guard.take()).await
    }

    /// Hand intents left by an applied command to the intent resolver.
    async fn cleanup_intents(
        &self,
        range_id: RangeId,
        intents: Vec<Intent>,
        end_txns: Vec<EndTxnIntents>,
    ) {
        if !intents.is_empty() {
            if let Err(err) = self
                .intent_resolver
                .cleanup_intents_async(intents, true)
                .await
            {
                warn!(%range_id, %err, "unable to clean up encountered intents");
            }
        }
        if !end_txns.is_empty() {
            if let Err(err) = self
                .intent_resolver
                .cleanup_txn_intents_async(range_id, end_txns, true)
                .await
            {
                warn!(%range_id, %err, "unable to clean up transaction intents");
            }
        }
    }
}

#[async_trait]
impl WriteBatchApi for ReplicaWriteService {
    async fn execute_write_batch(
        &self,
        ctx: &RequestContext,
        mut ba: BatchRequest,
        spans: SpanSet,
        mut guard: LatchGuard,
    ) -> Result<BatchResponse, WriteError> {
        let start = Instant::now();
        let range_id = ba.header.range_id;

        // Lease requests carry the lease they replace; everything else needs
        // this replica to hold the lease.
        let status = if ba.is_single_skip_lease_check_request() {
            None
        } else {
            Some(self.lease_authority.resolve_or_acquire_lease(ctx).await?)
        };
        let lease = match (&status, ba.prev_lease_for_lease_request()) {
            (Some(status), _) => status.lease.clone(),
            (None, Some(prev)) => prev.clone(),
            (None, None) => invariant_violation("lease request without a previous lease"),
        };

        if ba.txn().is_some() {
            let node_id = self.lease_authority.replica_id().node_id;
            limit_txn_max_timestamp(&mut ba, node_id, status.as_ref());
        }

        self.lease_authority
            .check_can_proceed(&ba, status.as_ref())?;

        // From here on the untracker must fire exactly once; dropping it
        // untracks with zeros.
        let (min_ts, untracker) = self.closed_ts.track();

        let before = ba.write_timestamp();
        let bumped = self.ts_cache.apply_and_bump(&mut ba, min_ts);
        if !invariant_timestamp_not_regressed(before, ba.write_timestamp()) {
            invariant_violation(format!(
                "timestamp cache moved batch backwards from {} to {}",
                before,
                ba.write_timestamp()
            ));
        }
        if bumped {
            debug!(from = %before, to = %ba.write_timestamp(), "applied timestamp cache");
        }

        if let Some(err) = ctx.err() {
            return Err(WriteError::AbortedBeforeProposing(err.to_string()));
        }

        let handle = match self
            .evaluate_and_propose(&lease, &mut ba, &spans, &mut guard)
            .await
        {
            Ok(handle) => handle,
            Err(ProposalError {
                error,
                max_lease_index,
            }) => {
                if !invariant_failed_proposal_unsequenced(max_lease_index) {
                    invariant_violation(format!(
                        "finished proposal with error {error} and lease index {max_lease_index}"
                    ));
                }
                return Err(error);
            }
        };
        let ProposalHandle {
            mut completion,
            abandon,
            max_lease_index,
        } = handle;
        if max_lease_index != 0 {
            untracker.untrack(lease.epoch, range_id, max_lease_index);
        }

        let mut abandon = Some(abandon);
        let mut quiesce = self.should_quiesce.clone();
        let slow_timer = tokio::time::sleep(self.config.slow_request_threshold());
        tokio::pin!(slow_timer);
        let mut slow = false;

        let result = loop {
            tokio::select! {
                res = &mut completion => {
                    let Ok(ProposalResult { outcome, encountered_intents, end_txns, .. }) = res else {
                        metrics::record_ambiguous_result("dropped");
                        break Err(WriteError::AmbiguousResult(
                            "proposal dropped without a result".into(),
                        ));
                    };
                    self.cleanup_intents(range_id, encountered_intents, end_txns).await;
                    break outcome;
                }
                _ = &mut slow_timer, if !slow => {
                    slow = true;
                    self.slow_proposals.fetch_add(1, Ordering::Relaxed);
                    metrics::record_slow_proposal_started();
                    warn!(
                        %range_id,
                        elapsed_secs = start.elapsed().as_secs_f64(),
                        batch = %ba.summary(),
                        "have been waiting for proposed command to apply; this range is likely unavailable"
                    );
                }
                err = ctx.done() => {
                    if let Some(abandon) = abandon.take() {
                        abandon();
                    }
                    metrics::record_ambiguous_result("canceled");
                    debug!(
                        elapsed_secs = start.elapsed().as_secs_f64(),
                        batch = %ba.summary(),
                        "context done after proposing command"
                    );
                    break Err(WriteError::AmbiguousResult(err.to_string()));
                }
                _ = quiesce.wait() => {
                    if let Some(abandon) = abandon.take() {
                        abandon();
                    }
                    metrics::record_ambiguous_result("shutdown");
                    debug!(batch = %ba.summary(), "shutdown cancellation of command");
                    break Err(WriteError::AmbiguousResult("server shutdown".into()));
                }
            }
        };

        if slow {
            self.slow_proposals.fetch_sub(1, Ordering::Relaxed);
            metrics::record_slow_proposal_finished();
            info!(
                %range_id,
                elapsed_secs = start.elapsed().as_secs_f64(),
                "slow command finished"
            );
        }

        if bumped {
            if let Ok(br) = &result {
                if !invariant_bumped_response_carries_txn(&ba, br) {
                    invariant_violation(format!(
                        "timestamp cache bumped transactional batch {} but response has no txn",
                        ba.summary()
                    ));
                }
            }
        }
        result
    }
}
