//! In-memory MVCC storage engine.
//!
//! Every key keeps its committed versions plus at most one intent. Batches
//! buffer their changes in a private overlay and publish them atomically on
//! commit.

use crate::domain::{Intent, MvccStats, Transaction, TransactionStatus, TxnMeta, WriteError};
use crate::ports::{EngineBatch, StorageEngine};
use parking_lot::RwLock;
use shared_types::{Key, Span, Timestamp, TxnId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone)]
struct IntentValue {
    txn: TxnMeta,
    timestamp: Timestamp,
    value: Option<Vec<u8>>,
}

impl IntentValue {
    fn identity(&self) -> (TxnId, Timestamp) {
        (self.txn.id, self.timestamp)
    }
}

#[derive(Debug, Clone, Default)]
struct KeyHistory {
    /// `None` values are deletion tombstones.
    versions: BTreeMap<Timestamp, Option<Vec<u8>>>,
    intent: Option<IntentValue>,
}

impl KeyHistory {
    fn is_empty(&self) -> bool {
        self.versions.is_empty() && self.intent.is_none()
    }

    fn latest_timestamp(&self) -> Option<Timestamp> {
        self.versions.keys().next_back().copied()
    }

    fn value_at(&self, ts: Timestamp) -> Option<Vec<u8>> {
        self.versions
            .range(..=ts)
            .next_back()
            .and_then(|(_, v)| v.clone())
    }

    fn intent_identity(&self) -> Option<(TxnId, Timestamp)> {
        self.intent.as_ref().map(IntentValue::identity)
    }

    fn conflicting_intent(&self, key: &Key, txn: Option<&Transaction>) -> Option<Intent> {
        let intent = self.intent.as_ref()?;
        if txn.is_some_and(|txn| txn.id == intent.txn.id) {
            return None;
        }
        Some(Intent {
            span: Span::point(key.clone()),
            txn: intent.txn.clone(),
        })
    }

    fn owned_by(&self, txn: &Transaction) -> bool {
        self.intent
            .as_ref()
            .is_some_and(|intent| intent.txn.id == txn.id && intent.txn.epoch <= txn.epoch)
    }

    /// Resolve `txn`'s intent on this key according to its status. Returns
    /// false when the key holds no intent of `txn`.
    fn resolve(&mut self, stats: &mut MvccStats, txn: &Transaction) -> bool {
        if !self.owned_by(txn) {
            return false;
        }
        let Some(intent) = self.intent.take() else {
            return false;
        };
        let len = value_len(&intent.value);
        match txn.status {
            TransactionStatus::Committed => {
                stats.intent_count -= 1;
                stats.intent_bytes -= len;
                stats.val_count += 1;
                stats.val_bytes += len;
                self.versions.insert(txn.write_timestamp, intent.value);
            }
            TransactionStatus::Aborted => {
                stats.intent_count -= 1;
                stats.intent_bytes -= len;
                if self.is_empty() {
                    stats.key_count -= 1;
                }
            }
            TransactionStatus::Pending => {
                let mut pushed = intent;
                pushed.timestamp.forward(txn.write_timestamp);
                pushed.txn.write_timestamp.forward(txn.write_timestamp);
                self.intent = Some(pushed);
            }
        }
        true
    }
}

/// Changes a batch made to one key, merged into the committed history on
/// commit.
#[derive(Debug, Default)]
struct KeyDelta {
    /// Intent the batch observed when it first touched the key.
    base_intent: Option<(TxnId, Timestamp)>,
    versions: BTreeMap<Timestamp, Option<Vec<u8>>>,
    /// `Some(None)` clears the intent.
    intent: Option<Option<IntentValue>>,
}

fn value_len(value: &Option<Vec<u8>>) -> i64 {
    value.as_ref().map_or(0, |v| v.len() as i64)
}

#[derive(Default)]
struct EngineState {
    keys: BTreeMap<Key, KeyHistory>,
    txn_records: HashMap<TxnId, Transaction>,
    stats: MvccStats,
}

/// Shared handle to an in-memory engine. Clones see the same data.
#[derive(Clone, Default)]
pub struct InMemoryEngine {
    state: Arc<RwLock<EngineState>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest committed value of `key`.
    pub fn get(&self, key: &Key) -> Option<Vec<u8>> {
        let state = self.state.read();
        let history = state.keys.get(key)?;
        history.versions.values().next_back().cloned().flatten()
    }

    /// Committed value of `key` visible at `ts`.
    pub fn get_at(&self, key: &Key, ts: Timestamp) -> Option<Vec<u8>> {
        self.state.read().keys.get(key)?.value_at(ts)
    }

    /// Timestamp of the newest committed version of `key`.
    pub fn latest_timestamp(&self, key: &Key) -> Option<Timestamp> {
        self.state.read().keys.get(key)?.latest_timestamp()
    }

    pub fn intent(&self, key: &Key) -> Option<Intent> {
        let state = self.state.read();
        let intent = state.keys.get(key)?.intent.as_ref()?;
        Some(Intent {
            span: Span::point(key.clone()),
            txn: intent.txn.clone(),
        })
    }

    pub fn txn_record(&self, id: &TxnId) -> Option<Transaction> {
        self.state.read().txn_records.get(id).cloned()
    }

    /// Accumulated statistics of every applied command.
    pub fn stats(&self) -> MvccStats {
        self.state.read().stats
    }

    pub fn apply_stats(&self, delta: &MvccStats) {
        self.state.write().stats.add(delta);
    }

    /// Resolve `txn`'s intents in `span` directly against committed state.
    /// Ownership is checked and the stats delta is applied under one write
    /// lock, so resolving the same intent twice changes nothing the second
    /// time. Returns the applied delta.
    pub fn resolve_intents(&self, span: &Span, txn: &Transaction) -> MvccStats {
        let mut state = self.state.write();
        let mut delta = MvccStats::default();
        let mut emptied = Vec::new();
        for (key, history) in state.keys.range_mut(span.key.clone()..span.exclusive_end()) {
            if history.resolve(&mut delta, txn) && history.is_empty() {
                emptied.push(key.clone());
            }
        }
        for key in emptied {
            state.keys.remove(&key);
        }
        state.stats.add(&delta);
        delta
    }

    pub fn remove_txn_record(&self, id: &TxnId) {
        self.state.write().txn_records.remove(id);
    }

    /// Committed `(key, value)` pairs at their latest version, skipping
    /// deleted keys.
    pub fn snapshot(&self) -> Vec<(Key, Vec<u8>)> {
        self.state
            .read()
            .keys
            .iter()
            .filter_map(|(k, h)| {
                let value = h.versions.values().next_back()?.clone()?;
                Some((k.clone(), value))
            })
            .collect()
    }
}

impl StorageEngine for InMemoryEngine {
    fn new_batch(&self) -> Box<dyn EngineBatch> {
        Box::new(InMemoryBatch {
            state: self.state.clone(),
            keys: BTreeMap::new(),
            deltas: BTreeMap::new(),
            txn_records: HashMap::new(),
        })
    }
}

/// A pending batch over [`InMemoryEngine`].
pub struct InMemoryBatch {
    state: Arc<RwLock<EngineState>>,
    /// Copies of touched keys, modified in place and read back during
    /// evaluation.
    keys: BTreeMap<Key, KeyHistory>,
    deltas: BTreeMap<Key, KeyDelta>,
    /// `None` marks a deleted record.
    txn_records: HashMap<TxnId, Option<Transaction>>,
}

impl InMemoryBatch {
    fn with_history<R>(&self, key: &Key, f: impl FnOnce(Option<&KeyHistory>) -> R) -> R {
        match self.keys.get(key) {
            Some(history) => f(Some(history)),
            None => f(self.state.read().keys.get(key)),
        }
    }

    fn touch(&mut self, key: &Key) -> (&mut KeyHistory, &mut KeyDelta) {
        if !self.keys.contains_key(key) {
            let base = self.state.read().keys.get(key).cloned().unwrap_or_default();
            self.keys.insert(key.clone(), base);
        }
        let history = self.keys.entry(key.clone()).or_default();
        let delta = self.deltas.entry(key.clone()).or_insert_with(|| KeyDelta {
            base_intent: history.intent_identity(),
            ..KeyDelta::default()
        });
        (history, delta)
    }

    fn keys_in(&self, span: &Span) -> Vec<Key> {
        let end = span.exclusive_end();
        let mut keys: BTreeSet<Key> = self
            .state
            .read()
            .keys
            .range(span.key.clone()..end.clone())
            .map(|(k, _)| k.clone())
            .collect();
        keys.extend(
            self.keys
                .range(span.key.clone()..end)
                .map(|(k, _)| k.clone()),
        );
        keys.into_iter().collect()
    }
}

impl EngineBatch for InMemoryBatch {
    fn mvcc_get(
        &self,
        key: &Key,
        ts: Timestamp,
        txn: Option<&Transaction>,
    ) -> Result<Option<Vec<u8>>, WriteError> {
        self.with_history(key, |history| {
            let Some(history) = history else {
                return Ok(None);
            };
            if let Some(intent) = &history.intent {
                if txn.is_some_and(|txn| txn.id == intent.txn.id) {
                    return Ok(intent.value.clone());
                }
                if intent.timestamp <= ts {
                    if let Some(conflict) = history.conflicting_intent(key, txn) {
                        return Err(WriteError::WriteIntent {
                            intents: vec![conflict],
                        });
                    }
                }
            }
            Ok(history.value_at(ts))
        })
    }

    fn mvcc_put(
        &mut self,
        stats: &mut MvccStats,
        key: &Key,
        ts: Timestamp,
        value: Option<Vec<u8>>,
        txn: Option<&Transaction>,
    ) -> Result<(), WriteError> {
        self.with_history(key, |history| {
            let Some(history) = history else {
                return Ok(());
            };
            if let Some(conflict) = history.conflicting_intent(key, txn) {
                return Err(WriteError::WriteIntent {
                    intents: vec![conflict],
                });
            }
            match history.latest_timestamp() {
                Some(latest) if latest >= ts => Err(WriteError::WriteTooOld {
                    timestamp: ts,
                    actual_timestamp: latest.next(),
                }),
                _ => Ok(()),
            }
        })?;

        let (history, delta) = self.touch(key);
        if history.is_empty() {
            stats.key_count += 1;
        }
        let len = value_len(&value);
        match txn {
            Some(txn) => {
                match history.intent.take() {
                    Some(own) => stats.intent_bytes -= value_len(&own.value),
                    None => stats.intent_count += 1,
                }
                stats.intent_bytes += len;
                let intent = IntentValue {
                    txn: txn.meta(),
                    timestamp: ts,
                    value,
                };
                history.intent = Some(intent.clone());
                delta.intent = Some(Some(intent));
            }
            None => {
                stats.val_count += 1;
                stats.val_bytes += len;
                history.versions.insert(ts, value.clone());
                delta.versions.insert(ts, value);
            }
        }
        Ok(())
    }

    fn mvcc_resolve_intents(
        &mut self,
        stats: &mut MvccStats,
        span: &Span,
        txn: &Transaction,
    ) -> Result<Vec<Key>, WriteError> {
        let mut resolved = Vec::new();
        for key in self.keys_in(span) {
            if !self.with_history(&key, |history| history.is_some_and(|h| h.owned_by(txn))) {
                continue;
            }
            let (history, delta) = self.touch(&key);
            if !history.resolve(stats, txn) {
                continue;
            }
            delta.intent = Some(history.intent.clone());
            if txn.status == TransactionStatus::Committed {
                if let Some(value) = history.versions.get(&txn.write_timestamp) {
                    delta.versions.insert(txn.write_timestamp, value.clone());
                }
            }
            resolved.push(key);
        }
        Ok(resolved)
    }

    fn get_txn_record(&self, txn: &Transaction) -> Result<Option<Transaction>, WriteError> {
        match self.txn_records.get(&txn.id) {
            Some(record) => Ok(record.clone()),
            None => Ok(self.state.read().txn_records.get(&txn.id).cloned()),
        }
    }

    fn put_txn_record(&mut self, txn: &Transaction) -> Result<(), WriteError> {
        self.txn_records.insert(txn.id, Some(txn.clone()));
        Ok(())
    }

    fn delete_txn_record(&mut self, txn: &Transaction) -> Result<(), WriteError> {
        self.txn_records.insert(txn.id, None);
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.deltas.is_empty() && self.txn_records.is_empty()
    }

    fn commit(self: Box<Self>) -> Result<(), WriteError> {
        let InMemoryBatch {
            state,
            deltas,
            txn_records,
            ..
        } = *self;
        let mut state = state.write();
        for (key, delta) in deltas {
            let history = state.keys.entry(key.clone()).or_default();
            // An intent change only lands on the intent it was computed
            // against.
            if delta.intent.is_some() && history.intent_identity() != delta.base_intent {
                trace!(%key, "intent changed under batch; skipping stale key update");
                if history.is_empty() {
                    state.keys.remove(&key);
                }
                continue;
            }
            history.versions.extend(delta.versions);
            if let Some(intent) = delta.intent {
                history.intent = intent;
            }
            if history.is_empty() {
                state.keys.remove(&key);
            }
        }
        for (id, record) in txn_records {
            match record {
                Some(record) => {
                    state.txn_records.insert(id, record);
                }
                None => {
                    state.txn_records.remove(&id);
                }
            }
        }
        Ok(())
    }

    fn close(self: Box<Self>) {}
}
