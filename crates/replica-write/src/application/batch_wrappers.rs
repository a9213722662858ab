//! Engine batch decorators applied during evaluation.

use crate::domain::{
    LogicalOp, LogicalOpLog, MvccStats, SpanAccess, SpanSet, Transaction, TransactionStatus,
    WriteError,
};
use crate::ports::EngineBatch;
use parking_lot::Mutex;
use shared_types::{Key, Span, Timestamp};
use std::sync::Arc;

/// Records a logical op for every successful mutation of the wrapped batch.
pub struct OpLoggerBatch {
    inner: Box<dyn EngineBatch>,
    ops: Arc<Mutex<Vec<LogicalOp>>>,
}

/// Read side of an [`OpLoggerBatch`], kept by the evaluator.
#[derive(Clone)]
pub struct OpLogHandle {
    ops: Arc<Mutex<Vec<LogicalOp>>>,
}

impl OpLogHandle {
    pub fn take(&self) -> LogicalOpLog {
        LogicalOpLog {
            ops: std::mem::take(&mut *self.ops.lock()),
        }
    }
}

impl OpLoggerBatch {
    pub fn wrap(inner: Box<dyn EngineBatch>) -> (Box<dyn EngineBatch>, OpLogHandle) {
        let ops = Arc::new(Mutex::new(Vec::new()));
        let handle = OpLogHandle { ops: ops.clone() };
        (Box::new(Self { inner, ops }), handle)
    }

    fn record(&self, op: LogicalOp) {
        self.ops.lock().push(op);
    }
}

impl EngineBatch for OpLoggerBatch {
    fn mvcc_get(
        &self,
        key: &Key,
        ts: Timestamp,
        txn: Option<&Transaction>,
    ) -> Result<Option<Vec<u8>>, WriteError> {
        self.inner.mvcc_get(key, ts, txn)
    }

    fn mvcc_put(
        &mut self,
        stats: &mut MvccStats,
        key: &Key,
        ts: Timestamp,
        value: Option<Vec<u8>>,
        txn: Option<&Transaction>,
    ) -> Result<(), WriteError> {
        let op = match txn {
            Some(txn) => LogicalOp::WriteIntent {
                txn_id: txn.id,
                key: key.clone(),
                timestamp: ts,
            },
            None => LogicalOp::WriteValue {
                key: key.clone(),
                timestamp: ts,
                value: value.clone(),
            },
        };
        self.inner.mvcc_put(stats, key, ts, value, txn)?;
        self.record(op);
        Ok(())
    }

    fn mvcc_resolve_intents(
        &mut self,
        stats: &mut MvccStats,
        span: &Span,
        txn: &Transaction,
    ) -> Result<Vec<Key>, WriteError> {
        let resolved = self.inner.mvcc_resolve_intents(stats, span, txn)?;
        for key in &resolved {
            match txn.status {
                TransactionStatus::Committed => self.record(LogicalOp::CommitIntent {
                    txn_id: txn.id,
                    key: key.clone(),
                    timestamp: txn.write_timestamp,
                }),
                TransactionStatus::Aborted => self.record(LogicalOp::AbortIntent {
                    txn_id: txn.id,
                    key: key.clone(),
                }),
                TransactionStatus::Pending => {}
            }
        }
        Ok(resolved)
    }

    fn get_txn_record(&self, txn: &Transaction) -> Result<Option<Transaction>, WriteError> {
        self.inner.get_txn_record(txn)
    }

    fn put_txn_record(&mut self, txn: &Transaction) -> Result<(), WriteError> {
        self.inner.put_txn_record(txn)
    }

    fn delete_txn_record(&mut self, txn: &Transaction) -> Result<(), WriteError> {
        self.inner.delete_txn_record(txn)
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn commit(self: Box<Self>) -> Result<(), WriteError> {
        self.inner.commit()
    }

    fn close(self: Box<Self>) {
        self.inner.close()
    }
}

/// Fails any access outside the declared span set.
pub struct SpanCheckedBatch {
    inner: Box<dyn EngineBatch>,
    spans: SpanSet,
}

impl SpanCheckedBatch {
    pub fn wrap(inner: Box<dyn EngineBatch>, spans: SpanSet) -> Box<dyn EngineBatch> {
        Box::new(Self { inner, spans })
    }

    fn check(&self, access: SpanAccess, key: &Key) -> Result<(), WriteError> {
        if self.spans.check_allowed(access, key) {
            Ok(())
        } else {
            Err(WriteError::SpanAccessViolation {
                access: access.to_string(),
                key: key.clone(),
            })
        }
    }
}

impl EngineBatch for SpanCheckedBatch {
    fn mvcc_get(
        &self,
        key: &Key,
        ts: Timestamp,
        txn: Option<&Transaction>,
    ) -> Result<Option<Vec<u8>>, WriteError> {
        self.check(SpanAccess::ReadOnly, key)?;
        self.inner.mvcc_get(key, ts, txn)
    }

    fn mvcc_put(
        &mut self,
        stats: &mut MvccStats,
        key: &Key,
        ts: Timestamp,
        value: Option<Vec<u8>>,
        txn: Option<&Transaction>,
    ) -> Result<(), WriteError> {
        self.check(SpanAccess::ReadWrite, key)?;
        self.inner.mvcc_put(stats, key, ts, value, txn)
    }

    fn mvcc_resolve_intents(
        &mut self,
        stats: &mut MvccStats,
        span: &Span,
        txn: &Transaction,
    ) -> Result<Vec<Key>, WriteError> {
        if !self.spans.check_allowed_span(SpanAccess::ReadWrite, span) {
            return Err(WriteError::SpanAccessViolation {
                access: SpanAccess::ReadWrite.to_string(),
                key: span.key.clone(),
            });
        }
        self.inner.mvcc_resolve_intents(stats, span, txn)
    }

    fn get_txn_record(&self, txn: &Transaction) -> Result<Option<Transaction>, WriteError> {
        self.check(SpanAccess::ReadOnly, &txn.key)?;
        self.inner.get_txn_record(txn)
    }

    fn put_txn_record(&mut self, txn: &Transaction) -> Result<(), WriteError> {
        self.check(SpanAccess::ReadWrite, &txn.key)?;
        self.inner.put_txn_record(txn)
    }

    fn delete_txn_record(&mut self, txn: &Transaction) -> Result<(), WriteError> {
        self.check(SpanAccess::ReadWrite, &txn.key)?;
        self.inner.delete_txn_record(txn)
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn commit(self: Box<Self>) -> Result<(), WriteError> {
        self.inner.commit()
    }

    fn close(self: Box<Self>) {
        self.inner.close()
    }
}
