//! Background intent cleanup over [`InMemoryEngine`].

use super::engine::InMemoryEngine;
use crate::domain::{EndTxnIntents, Intent, WriteError};
use crate::ports::IntentResolver;
use async_trait::async_trait;
use shared_types::RangeId;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

/// Resolves intents on spawned tasks, at most `limit` at a time.
#[derive(Clone)]
pub struct AsyncIntentResolver {
    engine: InMemoryEngine,
    sem: Arc<Semaphore>,
    limit: usize,
}

impl AsyncIntentResolver {
    pub fn new(engine: InMemoryEngine, limit: usize) -> Self {
        Self {
            engine,
            sem: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Wait until no cleanup task is running.
    pub async fn wait_idle(&self) {
        let permits = u32::try_from(self.limit).unwrap_or(u32::MAX);
        let _all = self.sem.acquire_many(permits).await;
    }

    /// Run `work` on a task if a slot is free, inline if `allow_sync`, and
    /// fail otherwise.
    fn run<F>(&self, allow_sync: bool, work: F) -> Result<(), WriteError>
    where
        F: FnOnce(&InMemoryEngine) + Send + 'static,
    {
        match self.sem.clone().try_acquire_owned() {
            Ok(permit) => {
                let engine = self.engine.clone();
                tokio::spawn(async move {
                    let _permit: OwnedSemaphorePermit = permit;
                    work(&engine);
                });
                Ok(())
            }
            Err(_) if allow_sync => {
                debug!(limit = self.limit, "intent resolver at capacity; cleaning up inline");
                work(&self.engine);
                Ok(())
            }
            Err(_) => Err(WriteError::TaskLimitExceeded { limit: self.limit }),
        }
    }
}

/// Resolve intents whose transaction has finished. Intents of transactions
/// still running are left alone.
fn resolve_intents(engine: &InMemoryEngine, intents: &[Intent]) {
    for intent in intents {
        let Some(record) = engine.txn_record(&intent.txn.id) else {
            trace!(txn = %intent.txn.id, "no record for intent owner; skipping");
            continue;
        };
        if !record.status.is_finalized() {
            continue;
        }
        engine.resolve_intents(&intent.span, &record);
    }
}

/// Resolve the external intents of finalized transactions and then remove
/// their records.
fn resolve_txn_intents(
    engine: &InMemoryEngine,
    range_id: RangeId,
    end_txns: &[EndTxnIntents],
) {
    for et in end_txns {
        // Cleanup runs without latches, so each span is resolved atomically
        // against whatever is committed by then.
        for span in &et.external_spans {
            engine.resolve_intents(span, &et.txn);
        }
        engine.remove_txn_record(&et.txn.id);
        debug!(%range_id, txn = %et.txn.id, spans = et.external_spans.len(), "cleaned up transaction");
    }
}

#[async_trait]
impl IntentResolver for AsyncIntentResolver {
    async fn cleanup_intents_async(
        &self,
        intents: Vec<Intent>,
        allow_sync: bool,
    ) -> Result<(), WriteError> {
        if intents.is_empty() {
            return Ok(());
        }
        self.run(allow_sync, move |engine| resolve_intents(engine, &intents))
    }

    async fn cleanup_txn_intents_async(
        &self,
        range_id: RangeId,
        end_txns: Vec<EndTxnIntents>,
        allow_sync: bool,
    ) -> Result<(), WriteError> {
        if end_txns.is_empty() {
            return Ok(());
        }
        self.run(allow_sync, move |engine| {
            resolve_txn_intents(engine, range_id, &end_txns)
        })
    }
}
