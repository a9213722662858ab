//! Batch evaluation: the one-phase-commit fast path and server-side
//! refreshes.
//!
//! The evaluator only ever produces a pending engine batch. Committing it
//! is the consensus log's job.

use super::batch_wrappers::{OpLogHandle, OpLoggerBatch, SpanCheckedBatch};
use super::commands::{evaluate_command, run_commit_trigger, CommandArgs, EvalContext};
use crate::algorithms::{
    can_do_serverside_retry, can_forward_commit_timestamp_without_refresh,
    is_end_txn_exceeding_deadline, is_one_phase_commit,
    maybe_bump_read_timestamp_to_write_timestamp,
};
use crate::config::WriteConfig;
use crate::domain::invariants::{invariant_one_phase_commit_timestamps_aligned, invariant_violation};
use crate::domain::{
    BatchRequest, BatchResponse, MvccStats, Response, SideEffects, TransactionRetryReason,
    TransactionStatus, WriteError,
};
use crate::metrics;
use crate::ports::{EngineBatch, StorageEngine};
use std::sync::Arc;
use tracing::{debug, trace};

/// A batch is evaluated at most this many extra times at a bumped timestamp.
pub const MAX_SERVERSIDE_RETRIES: usize = 1;

/// Result of evaluating a batch. Exactly one of response or error.
pub struct Evaluation {
    pub batch: Box<dyn EngineBatch>,
    pub stats: MvccStats,
    pub effects: SideEffects,
    pub outcome: Result<BatchResponse, WriteError>,
}

impl Evaluation {
    fn failed(batch: Box<dyn EngineBatch>, error: WriteError) -> Self {
        Self {
            batch,
            stats: MvccStats::default(),
            effects: SideEffects::default(),
            outcome: Err(error),
        }
    }
}

pub struct BatchEvaluator {
    engine: Arc<dyn StorageEngine>,
    logical_op_logging: bool,
    assert_span_access: bool,
}

impl BatchEvaluator {
    pub fn new(engine: Arc<dyn StorageEngine>, config: &WriteConfig) -> Self {
        Self {
            engine,
            logical_op_logging: config.logical_op_logging,
            assert_span_access: config.assert_span_access,
        }
    }

    /// Evaluate a write batch, taking the one-phase-commit path when the
    /// batch is eligible and it succeeds.
    ///
    /// `ba` may come back with a higher timestamp than it went in with.
    pub fn evaluate_write_batch(&self, rec: &EvalContext<'_>, ba: &mut BatchRequest) -> Evaluation {
        maybe_bump_read_timestamp_to_write_timestamp(ba);

        if is_one_phase_commit(ba) {
            if let Some(eval) = self.try_one_phase_commit(rec, ba) {
                return eval;
            }
        }

        self.evaluate_with_serverside_refreshes(rec, MvccStats::default(), ba)
    }

    /// Evaluate the batch without its transaction and EndTxn, committing the
    /// writes directly. Returns `None` to fall back to the full path.
    fn try_one_phase_commit(&self, rec: &EvalContext<'_>, ba: &BatchRequest) -> Option<Evaluation> {
        debug!("attempting 1PC execution");
        if !invariant_one_phase_commit_timestamps_aligned(ba) {
            invariant_violation(format!(
                "batch timestamp {} diverged from txn write timestamp {:?}",
                ba.header.timestamp,
                ba.txn().map(|t| t.write_timestamp)
            ));
        }
        let txn = ba.header.txn.clone()?;
        let et = ba.end_txn()?.clone();

        let mut stripped = ba.clone();
        stripped.header.txn = None;
        stripped.requests.pop();

        let Evaluation {
            mut batch,
            mut stats,
            mut effects,
            outcome,
        } = self.evaluate_with_serverside_refreshes(rec, MvccStats::default(), &mut stripped);

        match outcome {
            Ok(mut br) => {
                let commit_ts = br.timestamp;
                let pushed = commit_ts != ba.header.timestamp;
                if !pushed
                    || (can_forward_commit_timestamp_without_refresh(&txn, &et)
                        && !is_end_txn_exceeding_deadline(commit_ts, &et))
                {
                    let mut finished = txn.clone();
                    finished.write_timestamp.forward(commit_ts);
                    if et.commit {
                        finished.status = TransactionStatus::Committed;
                        let trigger = run_commit_trigger(rec, &et, &finished)
                            .and_then(|trigger| effects.merge_and_destroy(trigger));
                        if let Err(err) = trigger {
                            metrics::record_one_phase_commit("failed");
                            return Some(Evaluation::failed(batch, err));
                        }
                    } else {
                        finished.status = TransactionStatus::Aborted;
                        batch.close();
                        batch = self.engine.new_batch();
                        stats = MvccStats::default();
                        effects.logical_op_log = None;
                    }
                    br.responses.push(Response::EndTxn {
                        one_phase_commit: true,
                    });
                    br.txn = Some(finished);
                    metrics::record_one_phase_commit("committed");
                    return Some(Evaluation {
                        batch,
                        stats,
                        effects,
                        outcome: Ok(br),
                    });
                }
                if et.require_one_phase_commit {
                    metrics::record_one_phase_commit("failed");
                    return Some(Evaluation::failed(
                        batch,
                        WriteError::retry(
                            TransactionRetryReason::RetrySerializable,
                            "Require1PC batch pushed",
                            &txn,
                        ),
                    ));
                }
            }
            Err(err) => {
                if et.require_one_phase_commit {
                    metrics::record_one_phase_commit("failed");
                    return Some(Evaluation::failed(batch, err));
                }
            }
        }

        batch.close();
        metrics::record_one_phase_commit("fallback");
        debug!("1PC execution failed, reverting to regular execution for batch");
        None
    }

    /// Evaluate `ba`, retrying once at a higher timestamp if it fails with
    /// a conflict a timestamp bump can fix. Stats restart from `baseline`
    /// on every attempt.
    pub fn evaluate_with_serverside_refreshes(
        &self,
        rec: &EvalContext<'_>,
        baseline: MvccStats,
        ba: &mut BatchRequest,
    ) -> Evaluation {
        let mut retries = 0;
        loop {
            let mut stats = baseline;
            let (mut batch, op_log) = self.prepare_batch(rec);
            let (outcome, mut effects) = evaluate_batch(batch.as_mut(), rec, &mut stats, ba);

            let err = match outcome {
                Ok(br) => {
                    if let Some(log) = op_log {
                        effects.logical_op_log = Some(log.take());
                    }
                    return Evaluation {
                        batch,
                        stats,
                        effects,
                        outcome: Ok(br),
                    };
                }
                Err(err) => err,
            };

            if retries >= MAX_SERVERSIDE_RETRIES || !can_do_serverside_retry(&err, ba) {
                return Evaluation {
                    batch,
                    stats,
                    effects,
                    outcome: Err(err),
                };
            }
            debug!(%err, timestamp = %ba.header.timestamp, "server-side retry of batch");
            metrics::record_serverside_retry();
            batch.close();
            retries += 1;
        }
    }

    fn prepare_batch(&self, rec: &EvalContext<'_>) -> (Box<dyn EngineBatch>, Option<OpLogHandle>) {
        let mut batch = self.engine.new_batch();
        let mut op_log = None;
        if self.logical_op_logging {
            let (wrapped, handle) = OpLoggerBatch::wrap(batch);
            batch = wrapped;
            op_log = Some(handle);
        }
        if self.assert_span_access {
            batch = SpanCheckedBatch::wrap(batch, rec.spans.clone());
        }
        (batch, op_log)
    }
}

/// Evaluate every request of `ba` in order against `batch`.
///
/// The transaction is copied; the copy collects the updates of this
/// attempt and is returned with the response.
pub fn evaluate_batch(
    batch: &mut dyn EngineBatch,
    rec: &EvalContext<'_>,
    stats: &mut MvccStats,
    ba: &BatchRequest,
) -> (Result<BatchResponse, WriteError>, SideEffects) {
    let mut txn = ba.header.txn.clone();
    let mut effects = SideEffects::default();
    let mut responses = Vec::with_capacity(ba.requests.len());

    for req in &ba.requests {
        trace!(method = req.method(), "evaluating request");
        let args = CommandArgs {
            batch: &mut *batch,
            rec,
            stats: &mut *stats,
            timestamp: ba.header.timestamp,
            txn: txn.as_mut(),
        };
        match evaluate_command(req, args) {
            Ok(result) => {
                if let Err(err) = effects.merge_and_destroy(result.effects) {
                    return (Err(err), effects);
                }
                responses.push(result.response);
            }
            Err(err) => {
                effects.encountered_intents.extend(err.intents().iter().cloned());
                return (Err(err), effects);
            }
        }
    }

    let timestamp = txn
        .as_ref()
        .map_or(ba.header.timestamp, |t| t.write_timestamp);
    (
        Ok(BatchResponse {
            timestamp,
            txn,
            responses,
        }),
        effects,
    )
}
