//! Point-in-time pipeline metrics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of a pipeline's counters and running averages.
///
/// `total_analyses == successful_analyses + failed_analyses` always holds.
/// Cache hits count as successful analyses with zero processing time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Completed analyses, including cache hits
    pub total_analyses: u64,

    /// Successful analyses, including cache hits
    pub successful_analyses: u64,

    /// Failed analyses (analyzer errors and timeouts)
    pub failed_analyses: u64,

    /// Requests answered from the cache
    pub cache_hits: u64,

    /// Share of analyses answered from the cache
    pub cache_hit_rate: f64,

    /// Mean execution time across all analyses
    pub average_processing_time: Duration,

    /// Mean confidence across results that reported one
    pub average_confidence: f64,

    /// Number of results that reported a confidence
    pub confidence_samples: u64,

    /// Failed analyses caused by a timeout
    pub timeouts: u64,

    /// Requests deferred to the queue at submission
    pub queued_requests: u64,

    /// Requests cancelled while queued or executing
    pub cancelled_requests: u64,

    /// When the metrics last changed
    pub last_updated: Option<DateTime<Utc>>,
}

impl Metrics {
    /// Share of analyses that failed
    pub fn failure_rate(&self) -> f64 {
        if self.total_analyses == 0 {
            0.0
        } else {
            self.failed_analyses as f64 / self.total_analyses as f64
        }
    }
}
