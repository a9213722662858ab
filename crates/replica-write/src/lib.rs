//! # replica-write
//!
//! The replicated write path of a range replica.
//!
//! ## Architecture
//!
//! A write batch arrives holding latches over the spans it declared. The
//! service resolves the lease, registers the write with the closed
//! timestamp tracker and pushes its timestamp above earlier reads. The
//! batch is then evaluated into a pending engine batch, proposed to the
//! consensus log and awaited:
//!
//! ```text
//! execute_write_batch
//!   ├─ lease check ─ closed ts tracking ─ timestamp cache
//!   ├─ BatchEvaluator
//!   │     ├─ one-phase commit (transaction ends in the same batch)
//!   │     └─ evaluation with at most one server-side refresh
//!   ├─ ConsensusLog::propose
//!   └─ wait: applied | slow warning | caller gone | shutdown
//! ```
//!
//! A caller that gives up after the proposal was handed to the log gets an
//! ambiguous result: the command may still apply.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use replica_write::{ReplicaWriteService, WriteDependencies, WriteBatchApi};
//!
//! let service = ReplicaWriteService::new(deps);
//! let spans = SpanSet::for_batch(&ba);
//! let guard = latches.acquire(spans.clone()).await;
//! let br = service.execute_write_batch(&ctx, ba, spans, guard).await?;
//! ```

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-export main types
pub use application::{BatchEvaluator, MAX_SERVERSIDE_RETRIES};
pub use config::{ConfigError, WriteConfig};
pub use domain::{
    BatchRequest, BatchResponse, EndTxnRequest, LatchGuard, Request, RequestContext, Response,
    SpanSet, Stopper, Transaction, TransactionRetryReason, TransactionStatus, WriteError,
};
pub use ports::{
    ClosedTimestampTracker, ConsensusLog, IntentResolver, LeaseAuthority, StorageEngine,
    TimestampCache, WriteBatchApi,
};
pub use service::{ReplicaWriteService, WriteDependencies};
