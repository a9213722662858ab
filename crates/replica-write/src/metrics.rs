//! # Write Path Metrics
//!
//! Prometheus metrics for the replicated write path.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! replica-write = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `replica_write_slow_proposals` - Gauge of proposals outstanding past the slow threshold
//! - `replica_write_serverside_retries_total` - Counter of server-side batch retries
//! - `replica_write_one_phase_commits_total` - Counter of 1PC attempts (by outcome)
//! - `replica_write_ambiguous_results_total` - Counter of ambiguous results (by cause)

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Proposals currently outstanding past the slow threshold
    pub static ref SLOW_PROPOSALS: IntGauge = register_int_gauge!(
        "replica_write_slow_proposals",
        "Number of proposals outstanding past the slow request threshold"
    )
    .expect("Failed to create SLOW_PROPOSALS metric");

    /// Server-side retries at a bumped timestamp
    pub static ref SERVERSIDE_RETRIES: IntCounter = register_int_counter!(
        "replica_write_serverside_retries_total",
        "Total number of batches re-evaluated at a higher timestamp"
    )
    .expect("Failed to create SERVERSIDE_RETRIES metric");

    /// One-phase commit attempts, labeled by outcome
    pub static ref ONE_PHASE_COMMITS: IntCounterVec = register_int_counter_vec!(
        "replica_write_one_phase_commits_total",
        "Total number of one-phase commit attempts",
        &["outcome"]
    )
    .expect("Failed to create ONE_PHASE_COMMITS metric");

    /// Ambiguous results, labeled by cause
    pub static ref AMBIGUOUS_RESULTS: IntCounterVec = register_int_counter_vec!(
        "replica_write_ambiguous_results_total",
        "Total number of writes that returned an ambiguous result",
        &["cause"]
    )
    .expect("Failed to create AMBIGUOUS_RESULTS metric");
}

#[cfg(feature = "metrics")]
pub fn record_slow_proposal_started() {
    SLOW_PROPOSALS.inc();
}

#[cfg(feature = "metrics")]
pub fn record_slow_proposal_finished() {
    SLOW_PROPOSALS.dec();
}

#[cfg(feature = "metrics")]
pub fn record_serverside_retry() {
    SERVERSIDE_RETRIES.inc();
}

/// Record a one-phase commit attempt (`committed`, `fallback`, `failed`)
#[cfg(feature = "metrics")]
pub fn record_one_phase_commit(outcome: &str) {
    ONE_PHASE_COMMITS.with_label_values(&[outcome]).inc();
}

/// Record an ambiguous result (`canceled`, `shutdown`, `dropped`)
#[cfg(feature = "metrics")]
pub fn record_ambiguous_result(cause: &str) {
    AMBIGUOUS_RESULTS.with_label_values(&[cause]).inc();
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_slow_proposal_started() {}

#[cfg(not(feature = "metrics"))]
pub fn record_slow_proposal_finished() {}

#[cfg(not(feature = "metrics"))]
pub fn record_serverside_retry() {}

#[cfg(not(feature = "metrics"))]
pub fn record_one_phase_commit(_outcome: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_ambiguous_result(_cause: &str) {}
