//! Evaluation of individual requests against a pending engine batch.

use crate::algorithms::is_end_txn_triggering_retry_error;
use crate::domain::{
    CommitTrigger, EndTxnIntents, EndTxnRequest, LeaseRequest, MvccStats, RangeDescriptor,
    Request, Response, SideEffects, SpanSet, Transaction, TransactionStatus, WriteError,
};
use crate::ports::EngineBatch;
use shared_types::{Key, Span, Timestamp};

/// Range-level state evaluation runs against.
pub struct EvalContext<'a> {
    pub desc: &'a RangeDescriptor,
    pub spans: &'a SpanSet,
}

pub struct CommandArgs<'a> {
    pub batch: &'a mut dyn EngineBatch,
    pub rec: &'a EvalContext<'a>,
    pub stats: &'a mut MvccStats,
    /// Timestamp of a non-transactional batch.
    pub timestamp: Timestamp,
    pub txn: Option<&'a mut Transaction>,
}

impl CommandArgs<'_> {
    fn write_timestamp(&self) -> Timestamp {
        self.txn
            .as_deref()
            .map_or(self.timestamp, |txn| txn.write_timestamp)
    }
}

pub struct CommandResult {
    pub response: Response,
    pub effects: SideEffects,
}

impl CommandResult {
    fn response(response: Response) -> Self {
        Self {
            response,
            effects: SideEffects::default(),
        }
    }
}

pub fn encode_int(value: i64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn decode_int(key: &Key, bytes: &[u8]) -> Result<i64, WriteError> {
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| WriteError::InvalidValue { key: key.clone() })?;
    Ok(i64::from_be_bytes(bytes))
}

pub fn evaluate_command(req: &Request, args: CommandArgs<'_>) -> Result<CommandResult, WriteError> {
    match req {
        Request::Put { key, value } => eval_put(args, key, value),
        Request::Delete { key } => eval_delete(args, key),
        Request::Increment { key, increment } => eval_increment(args, key, *increment),
        Request::EndTxn(et) => eval_end_txn(args, et),
        Request::RequestLease(req) | Request::TransferLease(req) => Ok(eval_lease(req)),
    }
}

fn eval_put(args: CommandArgs<'_>, key: &Key, value: &[u8]) -> Result<CommandResult, WriteError> {
    let ts = args.write_timestamp();
    args.batch
        .mvcc_put(args.stats, key, ts, Some(value.to_vec()), args.txn.as_deref())?;
    Ok(CommandResult::response(Response::Put))
}

fn eval_delete(args: CommandArgs<'_>, key: &Key) -> Result<CommandResult, WriteError> {
    let ts = args.write_timestamp();
    let found = args.batch.mvcc_get(key, ts, args.txn.as_deref())?.is_some();
    args.batch
        .mvcc_put(args.stats, key, ts, None, args.txn.as_deref())?;
    Ok(CommandResult::response(Response::Delete { found }))
}

fn eval_increment(
    args: CommandArgs<'_>,
    key: &Key,
    increment: i64,
) -> Result<CommandResult, WriteError> {
    let ts = args.write_timestamp();
    let current = match args.batch.mvcc_get(key, ts, args.txn.as_deref())? {
        Some(bytes) => decode_int(key, &bytes)?,
        None => 0,
    };
    let new_value = current
        .checked_add(increment)
        .ok_or_else(|| WriteError::IntegerOverflow { key: key.clone() })?;
    args.batch
        .mvcc_put(args.stats, key, ts, Some(encode_int(new_value)), args.txn.as_deref())?;
    Ok(CommandResult::response(Response::Increment { new_value }))
}

fn eval_lease(req: &LeaseRequest) -> CommandResult {
    CommandResult {
        response: Response::Lease,
        effects: SideEffects {
            new_lease: Some(req.lease.clone()),
            ..Default::default()
        },
    }
}

/// Finalize the transaction, resolve its intents inside this range and
/// leave the rest to the intent resolver.
fn eval_end_txn(args: CommandArgs<'_>, et: &EndTxnRequest) -> Result<CommandResult, WriteError> {
    let CommandArgs {
        batch,
        rec,
        stats,
        txn,
        ..
    } = args;
    let txn = txn.ok_or(WriteError::MissingTransaction { method: "EndTxn" })?;

    if let Some(existing) = batch.get_txn_record(txn)? {
        match existing.status {
            TransactionStatus::Aborted => {
                return Err(WriteError::TransactionAborted { txn_id: txn.id })
            }
            TransactionStatus::Committed => {
                return Err(WriteError::TransactionCommitted { txn_id: txn.id })
            }
            TransactionStatus::Pending => {
                txn.write_timestamp.forward(existing.write_timestamp);
            }
        }
    }

    if et.commit {
        if let Some((reason, message)) = is_end_txn_triggering_retry_error(txn, et) {
            return Err(WriteError::retry(reason, message, txn));
        }
        txn.status = TransactionStatus::Committed;
    } else {
        txn.status = TransactionStatus::Aborted;
    }

    let (local, external): (Vec<Span>, Vec<Span>) = et
        .lock_spans
        .iter()
        .cloned()
        .partition(|span| rec.desc.contains_span(span));
    for span in &local {
        batch.mvcc_resolve_intents(stats, span, txn)?;
    }

    let mut effects = SideEffects::default();
    if external.is_empty() {
        batch.delete_txn_record(txn)?;
    } else {
        batch.put_txn_record(txn)?;
        effects.end_txns.push(EndTxnIntents {
            txn: txn.clone(),
            external_spans: external,
        });
    }

    if et.commit {
        effects.merge_and_destroy(run_commit_trigger(rec, et, txn)?)?;
    }

    Ok(CommandResult {
        response: Response::EndTxn {
            one_phase_commit: false,
        },
        effects,
    })
}

/// Side effects requested by the commit trigger of a committing
/// transaction.
pub fn run_commit_trigger(
    rec: &EvalContext<'_>,
    et: &EndTxnRequest,
    txn: &Transaction,
) -> Result<SideEffects, WriteError> {
    let Some(trigger) = &et.commit_trigger else {
        return Ok(SideEffects::default());
    };
    match trigger {
        CommitTrigger::ModifiedSpan {
            system_config,
            node_liveness,
        } => {
            let mut effects = SideEffects {
                gossip_system_config: *system_config,
                ..Default::default()
            };
            if let Some(span) = node_liveness {
                if !rec.desc.contains_span(span) {
                    return Err(WriteError::CommitTrigger(format!(
                        "liveness span {:?} of {} outside of {}",
                        span, txn, rec.desc.range_id
                    )));
                }
                effects.gossip_node_liveness = Some(span.clone());
            }
            Ok(effects)
        }
    }
}
