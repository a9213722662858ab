//! # kv-telemetry
//!
//! Structured logging for the replica write path, configured from the
//! environment.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kv_telemetry::{init_tracing, TelemetryConfig};
//!
//! init_tracing(&TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `KV_SERVICE_NAME` | `replica-write` | Service name attached to startup logs |
//! | `KV_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `KV_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `KV_JSON_LOGS` | `false` | JSON lines instead of pretty output |

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Errors from telemetry setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid telemetry configuration: {0}")]
    Config(String),

    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}
