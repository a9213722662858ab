//! Configuration for the write path.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConfig {
    /// How long a proposal may be outstanding before it is reported as slow.
    pub slow_request_threshold_ms: u64,
    /// Record a logical op log with every replicated command (change feeds).
    pub logical_op_logging: bool,
    /// Check every key touched during evaluation against the declared spans.
    pub assert_span_access: bool,
    /// Maximum concurrent asynchronous intent cleanup tasks.
    pub intent_resolver_task_limit: usize,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            slow_request_threshold_ms: 60_000,
            logical_op_logging: false,
            assert_span_access: cfg!(debug_assertions),
            intent_resolver_task_limit: 1000,
        }
    }
}

impl WriteConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `KV_SLOW_REQUEST_THRESHOLD_MS`: slow proposal threshold (default: 60000)
    /// - `KV_RANGEFEED_ENABLED`: record logical op logs (default: false)
    /// - `KV_ASSERT_SPAN_ACCESS`: check span access (default: on in debug builds)
    /// - `KV_INTENT_RESOLVER_TASK_LIMIT`: async cleanup task limit (default: 1000)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            slow_request_threshold_ms: lookup("KV_SLOW_REQUEST_THRESHOLD_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.slow_request_threshold_ms),
            logical_op_logging: lookup("KV_RANGEFEED_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.logical_op_logging),
            assert_span_access: lookup("KV_ASSERT_SPAN_ACCESS")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.assert_span_access),
            intent_resolver_task_limit: lookup("KV_INTENT_RESOLVER_TASK_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.intent_resolver_task_limit),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slow_request_threshold_ms == 0 {
            return Err(ConfigError::MustBePositive("slow_request_threshold_ms"));
        }
        if self.intent_resolver_task_limit == 0 {
            return Err(ConfigError::MustBePositive("intent_resolver_task_limit"));
        }
        Ok(())
    }

    pub fn slow_request_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_request_threshold_ms)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true")
}
