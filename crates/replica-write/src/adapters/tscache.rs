//! Timestamp cache: the latest read timestamp of every key read recently.

use crate::domain::BatchRequest;
use crate::ports::TimestampCache;
use parking_lot::Mutex;
use shared_types::{Key, Span, Timestamp, TxnId};
use tracing::debug;

#[derive(Debug, Clone)]
struct ReadEntry {
    span: Span,
    timestamp: Timestamp,
    txn_id: Option<TxnId>,
}

#[derive(Debug, Default)]
struct CacheState {
    /// Lower bound for keys without an entry.
    low_water: Timestamp,
    entries: Vec<ReadEntry>,
}

#[derive(Debug, Default)]
pub struct InMemoryTimestampCache {
    state: Mutex<CacheState>,
}

impl InMemoryTimestampCache {
    pub fn new(low_water: Timestamp) -> Self {
        Self {
            state: Mutex::new(CacheState {
                low_water,
                entries: Vec::new(),
            }),
        }
    }

    /// Record a read of `span` at `ts`, on behalf of `txn_id` if set.
    pub fn add(&self, span: Span, ts: Timestamp, txn_id: Option<TxnId>) {
        self.state.lock().entries.push(ReadEntry {
            span,
            timestamp: ts,
            txn_id,
        });
    }

    /// Raise the floor for every key, e.g. on a new lease.
    pub fn set_low_water(&self, ts: Timestamp) {
        let mut state = self.state.lock();
        state.low_water.forward(ts);
        state.entries.retain(|e| e.timestamp > ts);
    }

    /// The latest read of `key` and the transaction that performed it.
    /// The owner is `None` if reads by different owners tie.
    pub fn get_max(&self, key: &Key) -> (Timestamp, Option<TxnId>) {
        let state = self.state.lock();
        let mut max = (state.low_water, None);
        for entry in state.entries.iter().filter(|e| e.span.contains_key(key)) {
            if entry.timestamp > max.0 {
                max = (entry.timestamp, entry.txn_id);
            } else if entry.timestamp == max.0 && entry.txn_id != max.1 {
                max.1 = None;
            }
        }
        max
    }
}

fn forward_write_timestamp(ba: &mut BatchRequest, ts: Timestamp) {
    match ba.header.txn.as_mut() {
        Some(txn) => {
            txn.write_timestamp.forward(ts);
        }
        None => {
            ba.header.timestamp.forward(ts);
        }
    }
}

impl TimestampCache for InMemoryTimestampCache {
    fn apply_and_bump(&self, ba: &mut BatchRequest, min_ts: Timestamp) -> bool {
        let before = ba.write_timestamp();
        let txn_id = ba.txn().map(|t| t.id);
        let keys: Vec<Key> = ba
            .requests
            .iter()
            .filter(|r| r.consults_timestamp_cache())
            .filter_map(|r| r.write_key().cloned())
            .collect();

        for key in &keys {
            let (read_ts, owner) = self.get_max(key);
            if owner.is_some() && owner == txn_id {
                continue;
            }
            forward_write_timestamp(ba, read_ts.next());
        }
        forward_write_timestamp(ba, min_ts);

        let after = ba.write_timestamp();
        if after != before {
            debug!(from = %before, to = %after, "forwarded write timestamp");
            return true;
        }
        false
    }
}
