//! Core pipeline logic.
//!
//! This module contains:
//! - ResultCache: bounded result cache and cache keys
//! - PriorityQueue / ActiveSet: admission control
//! - MetricsAggregator: incremental counters
//! - ResultBroadcaster: result stream
//! - History / ResultLog: in-memory and on-disk result records
//! - Pipeline: the orchestrator tying them together

pub mod broadcast;
pub mod cache;
pub mod error;
pub mod history;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod result_log;
pub mod settings;

// Re-export commonly used types
pub use broadcast::{BroadcastMode, ResultBroadcaster, ResultStream};
pub use cache::{generate_cache_key, ResultCache};
pub use error::PipelineError;
pub use history::History;
pub use metrics::MetricsAggregator;
pub use pipeline::{Pipeline, RequestOf, ResultOf};
pub use queue::{ActiveSet, PriorityQueue, QueuedItem};
pub use result_log::{ResultLog, ResultLogError};
pub use settings::{PipelineSettings, SettingsError};
