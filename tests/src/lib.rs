//! # Replica Write Path Test Suite
//!
//! Scenarios that run the write path against the in-memory adapters wired
//! together the way a replica wires them.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/              # Evaluation and end-to-end throughput
//! └── src/integration/
//!     ├── harness.rs        # One replica: engine, lease, log, latches
//!     ├── one_phase_commit.rs
//!     ├── ambiguity.rs      # Cancellation, shutdown, slow proposals
//!     ├── leases.rs
//!     ├── latches.rs
//!     └── intents.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p kv-tests
//! cargo test -p kv-tests integration::ambiguity::
//! cargo bench -p kv-tests
//! ```

pub mod integration;
