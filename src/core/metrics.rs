//! Incremental metrics aggregation.
//!
//! Every update is O(1): running averages use
//! `(old * old_count + sample) / new_count` so the unbounded history never
//! has to be scanned.

use std::time::Duration;

use chrono::Utc;

use crate::domain::{AnalysisResult, Metrics};

/// Running counters fed by the completion stream
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    current: Metrics,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed execution (success or failure)
    pub fn record<P>(&mut self, result: &AnalysisResult<P>) {
        self.record_analysis(result.success, false, result.processing_time);

        if let Some(confidence) = result.confidence {
            let m = &mut self.current;
            m.confidence_samples += 1;
            m.average_confidence = running_average(
                m.average_confidence,
                m.confidence_samples,
                confidence,
            );
        }
    }

    /// Record a request answered from the cache
    pub fn record_cache_hit(&mut self) {
        self.current.cache_hits += 1;
        self.record_analysis(true, true, Duration::ZERO);
    }

    /// Record a failed execution caused by a timeout
    pub fn record_timeout(&mut self) {
        self.current.timeouts += 1;
    }

    /// Record a request deferred to the queue
    pub fn record_queued(&mut self) {
        self.current.queued_requests += 1;
        self.current.last_updated = Some(Utc::now());
    }

    /// Record a cancelled request
    pub fn record_cancelled(&mut self) {
        self.current.cancelled_requests += 1;
        self.current.last_updated = Some(Utc::now());
    }

    /// Zero every counter
    pub fn reset(&mut self) {
        self.current = Metrics::default();
    }

    pub fn snapshot(&self) -> Metrics {
        self.current.clone()
    }

    fn record_analysis(&mut self, success: bool, cache_hit: bool, processing_time: Duration) {
        let m = &mut self.current;
        m.total_analyses += 1;
        if success {
            m.successful_analyses += 1;
        } else {
            m.failed_analyses += 1;
        }

        let n = m.total_analyses;
        let hit_sample = if cache_hit { 1.0 } else { 0.0 };
        m.cache_hit_rate = running_average(m.cache_hit_rate, n, hit_sample);

        let avg_secs = running_average(
            m.average_processing_time.as_secs_f64(),
            n,
            processing_time.as_secs_f64(),
        );
        m.average_processing_time = Duration::from_secs_f64(avg_secs.max(0.0));
        m.last_updated = Some(Utc::now());
    }
}

/// Fold one sample into an average over `new_count` samples
fn running_average(old: f64, new_count: u64, sample: f64) -> f64 {
    if new_count == 0 {
        return 0.0;
    }
    let old_count = (new_count - 1) as f64;
    (old * old_count + sample) / new_count as f64
}
