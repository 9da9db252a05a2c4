//! Pipeline settings: concurrency ceiling, cache size, timeouts and bounds.
//!
//! Every field has a serde default so a config file only needs to name the
//! values it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::broadcast::BroadcastMode;

/// Settings a pipeline cannot run with
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,

    #[error("request_timeout_ms must be greater than 0")]
    ZeroTimeout,
}

/// Tunables for a single pipeline instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Whether the pipeline accepts submissions (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum requests executing at once (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Maximum cached results (default: 100)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Per-request timeout in milliseconds (default: 30000)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Maximum deferred requests; None queues without bound, 0 disables queueing
    #[serde(default)]
    pub max_queue_depth: Option<usize>,

    /// Maximum results kept in history; None keeps everything (default: 1000)
    #[serde(default = "default_history_limit")]
    pub history_limit: Option<usize>,

    /// How far a result subscriber may lag before skipping (default: 256)
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Result delivery mode (default: fan_out)
    #[serde(default)]
    pub broadcast_mode: BroadcastMode,
}

fn default_enabled() -> bool {
    true
}
fn default_max_concurrent() -> usize {
    3
}
fn default_cache_capacity() -> usize {
    100
}
fn default_request_timeout_ms() -> u64 {
    30_000
} // 30s
fn default_history_limit() -> Option<usize> {
    Some(1000)
}
fn default_broadcast_capacity() -> usize {
    256
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_concurrent: default_max_concurrent(),
            cache_capacity: default_cache_capacity(),
            request_timeout_ms: default_request_timeout_ms(),
            max_queue_depth: None,
            history_limit: default_history_limit(),
            broadcast_capacity: default_broadcast_capacity(),
            broadcast_mode: BroadcastMode::default(),
        }
    }
}

impl PipelineSettings {
    /// The nominal maximum duration of one request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_concurrent == 0 {
            return Err(SettingsError::ZeroConcurrency);
        }
        if self.request_timeout_ms == 0 {
            return Err(SettingsError::ZeroTimeout);
        }
        Ok(())
    }
}
