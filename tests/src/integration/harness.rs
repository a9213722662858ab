//! # Single-Replica Harness
//!
//! Wires every in-memory adapter into one [`ReplicaWriteService`]:
//!
//! ```text
//! send(ba) ──→ SpanLatchManager ──→ ReplicaWriteService
//!                                      │  lease:  InMemoryLeaseAuthority (ManualClock)
//!                                      │  track:  InMemoryClosedTsTracker
//!                                      │  bump:   InMemoryTimestampCache
//!                                      ↓
//!                            InMemoryConsensusLog ──→ InMemoryEngine
//!                                      │
//!                            AsyncIntentResolver (cleanup)
//! ```
//!
//! The node must be started from inside a tokio runtime; the log spawns its
//! applier task on it.

use kv_telemetry::{init_tracing, TelemetryConfig};
use replica_write::adapters::{
    AsyncIntentResolver, InMemoryClosedTsTracker, InMemoryConsensusLog, InMemoryEngine,
    InMemoryLeaseAuthority, InMemoryTimestampCache, ManualClock, SpanLatchManager,
};
use replica_write::domain::{MvccStats, RangeDescriptor, Transaction};
use replica_write::ports::{EngineBatch, StorageEngine};
use replica_write::{
    BatchRequest, BatchResponse, EndTxnRequest, ReplicaWriteService, Request, RequestContext,
    SpanSet, Stopper, WriteBatchApi, WriteConfig, WriteDependencies, WriteError,
};
use shared_types::{Key, RangeId, ReplicaId, Span, Timestamp};
use std::sync::Arc;
use std::time::Duration;

pub const RANGE_ID: RangeId = RangeId(1);

/// Keys `[a, m)` belong to the test range; anything at or above `m` lives on
/// another range backed by the same engine.
pub const RANGE_START: &str = "a";
pub const RANGE_END: &str = "m";

/// Clock reading the node starts at.
pub const START_TIME: Timestamp = Timestamp::new(1_000, 0);

/// Install the log subscriber once per test binary. `KV_LOG_LEVEL` or
/// `RUST_LOG` raise verbosity.
pub fn init_test_tracing() {
    let mut config = TelemetryConfig::from_env();
    if std::env::var("KV_LOG_LEVEL").is_err() {
        config.log_level = "warn".to_string();
    }
    // Every test calls this; only the first install wins.
    let _ = init_tracing(&config);
}

pub struct TestNode {
    pub engine: InMemoryEngine,
    pub clock: Arc<ManualClock>,
    pub lease: Arc<InMemoryLeaseAuthority>,
    pub tracker: InMemoryClosedTsTracker,
    pub ts_cache: Arc<InMemoryTimestampCache>,
    pub log: Arc<InMemoryConsensusLog>,
    pub resolver: AsyncIntentResolver,
    pub latches: SpanLatchManager,
    pub stopper: Stopper,
    pub service: ReplicaWriteService,
}

impl TestNode {
    /// A node configured from `KV_*` variables, with span assertions on.
    pub fn start() -> Self {
        Self::with_config(WriteConfig {
            assert_span_access: true,
            ..WriteConfig::from_env()
        })
    }

    pub fn with_config(config: WriteConfig) -> Self {
        init_test_tracing();
        config.validate().expect("invalid write config");

        let engine = InMemoryEngine::new();
        let clock = Arc::new(ManualClock::new(START_TIME));
        let lease = Arc::new(InMemoryLeaseAuthority::new(
            ReplicaId::new(1, 1),
            RangeDescriptor::new(RANGE_ID, RANGE_START, RANGE_END),
            clock.clone(),
        ));
        let tracker = InMemoryClosedTsTracker::new();
        let ts_cache = Arc::new(InMemoryTimestampCache::new(Timestamp::ZERO));
        let log = Arc::new(InMemoryConsensusLog::spawn(engine.clone(), lease.clone()));
        let resolver = AsyncIntentResolver::new(engine.clone(), config.intent_resolver_task_limit);
        let stopper = Stopper::new();

        let service = ReplicaWriteService::new(WriteDependencies {
            lease_authority: lease.clone(),
            closed_ts: Arc::new(tracker.clone()),
            ts_cache: ts_cache.clone(),
            engine: Arc::new(engine.clone()),
            consensus: log.clone(),
            intent_resolver: Arc::new(resolver.clone()),
            should_quiesce: stopper.should_quiesce(),
            config,
        });

        Self {
            engine,
            clock,
            lease,
            tracker,
            ts_cache,
            log,
            resolver,
            latches: SpanLatchManager::new(),
            stopper,
            service,
        }
    }

    /// Latch the batch's spans and run it through the write path.
    pub async fn send(
        &self,
        ctx: &RequestContext,
        ba: BatchRequest,
    ) -> Result<BatchResponse, WriteError> {
        let spans = SpanSet::for_batch(&ba);
        let guard = self.latches.acquire(spans.clone()).await;
        self.service.execute_write_batch(ctx, ba, spans, guard).await
    }

    pub async fn put(&self, key: &str, value: &str, ts: Timestamp) -> Result<BatchResponse, WriteError> {
        let ba = BatchRequest::new(RANGE_ID, ts).with(Request::put(key, value));
        self.send(&RequestContext::background(), ba).await
    }

    /// Commit a value directly to the engine, bypassing the write path.
    pub fn seed(&self, key: &str, value: &str, ts: Timestamp) {
        self.write_direct(key, value, ts, None);
    }

    /// Leave an intent of `txn` directly in the engine, e.g. on a key of
    /// another range.
    pub fn seed_intent(&self, key: &str, value: &str, txn: &Transaction) {
        self.write_direct(key, value, txn.write_timestamp, Some(txn));
    }

    fn write_direct(&self, key: &str, value: &str, ts: Timestamp, txn: Option<&Transaction>) {
        let mut stats = MvccStats::default();
        let mut batch = self.engine.new_batch();
        batch
            .mvcc_put(&mut stats, &Key::from(key), ts, Some(value.as_bytes().to_vec()), txn)
            .expect("seed write");
        batch.commit().expect("seed commit");
        self.engine.apply_stats(&stats);
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.engine
            .get(&Key::from(key))
            .map(|v| String::from_utf8_lossy(&v).into_owned())
    }

    /// Wait for every latch to be released, e.g. by a command applying after
    /// its proposer gave up on it.
    pub async fn wait_latches_released(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.latches.held() > 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("latches still held");
    }
}

/// A transaction anchored at `anchor`, started at `ts`.
pub fn txn_at(anchor: &str, ts: Timestamp) -> Transaction {
    Transaction::new(anchor, ts, 0)
}

/// A batch writing `keys` and ending the transaction in one go.
pub fn one_pc_batch(txn: Transaction, keys: &[&str], mut et: EndTxnRequest) -> BatchRequest {
    et.lock_spans = keys.iter().map(|k| Span::point(*k)).collect();
    let mut ba = BatchRequest::transactional(RANGE_ID, txn);
    for key in keys {
        ba = ba.with(Request::put(*key, "v"));
    }
    ba.with(Request::EndTxn(et))
}
