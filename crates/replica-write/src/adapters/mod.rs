//! Adapters layer: in-memory implementations of the outbound ports.
//!
//! Together they run a single replica end to end: an MVCC engine, a
//! consensus log applying commands in order, lease bookkeeping, the
//! timestamp cache, closed timestamp tracking, span latches and an intent
//! resolver.

mod clock;
mod closedts;
mod consensus_log;
mod engine;
mod intent_resolver;
mod latch_manager;
mod lease;
mod tscache;

pub use clock::{ManualClock, SystemClock};
pub use closedts::InMemoryClosedTsTracker;
pub use consensus_log::InMemoryConsensusLog;
pub use engine::{InMemoryBatch, InMemoryEngine};
pub use intent_resolver::AsyncIntentResolver;
pub use latch_manager::SpanLatchManager;
pub use lease::{InMemoryLeaseAuthority, DEFAULT_LEASE_DURATION_NANOS};
pub use tscache::InMemoryTimestampCache;
