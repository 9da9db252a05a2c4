//! Main pipeline for request execution.
//!
//! Coordinates cache lookups, admission control, analyzer execution,
//! completion bookkeeping and queue draining. All state lives behind one
//! async mutex that is never held across the analyzer call or file I/O.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::adapters::Analyzer;
use crate::domain::{AnalysisResult, Metrics, Request};

use super::broadcast::{ResultBroadcaster, ResultStream};
use super::cache::ResultCache;
use super::error::PipelineError;
use super::history::History;
use super::metrics::MetricsAggregator;
use super::queue::{ActiveSet, PriorityQueue};
use super::result_log::ResultLog;
use super::settings::PipelineSettings;

/// Request type accepted by a pipeline over `A`
pub type RequestOf<A> = Request<<A as Analyzer>::Input, <A as Analyzer>::Options>;

/// Result type produced by a pipeline over `A`
pub type ResultOf<A> = AnalysisResult<<A as Analyzer>::Output>;

/// A queued request together with its precomputed cache key
struct Pending<A: Analyzer> {
    request: Arc<RequestOf<A>>,
    cache_key: Option<String>,
}

/// Everything mutated by the pipeline, guarded by a single lock
struct State<A: Analyzer> {
    enabled: bool,
    cache: ResultCache<ResultOf<A>>,
    queue: PriorityQueue<Pending<A>>,
    active: ActiveSet<Arc<RequestOf<A>>>,
    history: History<A::Output>,
    metrics: MetricsAggregator,
    broadcaster: ResultBroadcaster<ResultOf<A>>,
    draining: bool,
}

struct Inner<A: Analyzer> {
    analyzer: A,
    settings: PipelineSettings,
    state: Mutex<State<A>>,
    result_log: Option<ResultLog>,
    /// Signalled whenever an active-set slot is released
    slot_freed: Notify,
}

/// Bounded-concurrency, priority-ordered, cached request pipeline.
///
/// Cloning is cheap and yields a handle to the same pipeline.
pub struct Pipeline<A: Analyzer> {
    inner: Arc<Inner<A>>,
}

impl<A: Analyzer> Clone for Pipeline<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Analyzer> Pipeline<A> {
    /// Create a pipeline around an analyzer
    pub fn new(analyzer: A, settings: PipelineSettings) -> Self {
        Self::build(analyzer, settings, None)
    }

    /// Create a pipeline that also appends every completed result to a log
    pub fn with_result_log(analyzer: A, settings: PipelineSettings, log: ResultLog) -> Self {
        Self::build(analyzer, settings, Some(log))
    }

    fn build(analyzer: A, settings: PipelineSettings, result_log: Option<ResultLog>) -> Self {
        let state = State {
            enabled: settings.enabled,
            cache: ResultCache::new(settings.cache_capacity),
            queue: PriorityQueue::new(),
            active: ActiveSet::new(settings.max_concurrent),
            history: History::new(settings.history_limit),
            metrics: MetricsAggregator::new(),
            broadcaster: ResultBroadcaster::new(
                settings.broadcast_mode,
                settings.broadcast_capacity,
            ),
            draining: false,
        };

        Self {
            inner: Arc::new(Inner {
                analyzer,
                settings,
                state: Mutex::new(state),
                result_log,
                slot_freed: Notify::new(),
            }),
        }
    }

    pub fn analyzer(&self) -> &A {
        &self.inner.analyzer
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.inner.settings
    }

    /// Submit a request.
    ///
    /// Returns the cached or freshly computed result when the request runs
    /// inline. When every slot is busy the request is queued and
    /// `PipelineError::Queued` is returned at once; its result surfaces only
    /// through `subscribe()` and `history()`. An inline caller waits for the
    /// queue drain its completion triggers.
    ///
    /// Dropping the returned future does not abandon an admitted request:
    /// execution and the drain run on a spawned task.
    #[instrument(
        skip(self, request),
        fields(analyzer = %self.inner.analyzer.name(), request_id = %request.id, priority = %request.priority)
    )]
    pub async fn submit(&self, request: RequestOf<A>) -> Result<ResultOf<A>, PipelineError> {
        let request = Arc::new(request);
        let cache_key = self
            .inner
            .analyzer
            .cache_key(&request.input, &request.options);

        {
            let mut state = self.inner.state.lock().await;

            if !state.enabled {
                debug!("Pipeline disabled, rejecting request");
                return Err(PipelineError::Disabled);
            }

            // Cache check comes before admission, so hits never take a slot
            if let Some(key) = cache_key.as_deref() {
                if let Some(hit) = state.cache.lookup(key).cloned() {
                    state.metrics.record_cache_hit();
                    debug!(result_id = %hit.id, "Cache hit");
                    return Ok(hit);
                }
            }

            if state.active.contains(&request.id) || state.queue.contains(&request.id) {
                warn!("Request id already in flight, rejecting");
                return Err(PipelineError::Duplicate(request.id));
            }

            if !state.active.has_capacity() {
                if let Some(max_queue_depth) = self.inner.settings.max_queue_depth {
                    if state.queue.len() >= max_queue_depth {
                        warn!(max_queue_depth, "Queue full, rejecting request");
                        return Err(PipelineError::CapacityExceeded { max_queue_depth });
                    }
                }

                let id = request.id;
                let priority = request.priority;
                state.queue.push(id, priority, Pending { request, cache_key });
                state.metrics.record_queued();
                info!(queue_depth = state.queue.len(), "At capacity, request queued");
                return Err(PipelineError::Queued(id));
            }

            state.active.insert(request.id, Arc::clone(&request));
        }

        let id = request.id;
        let this = self.clone();
        let task = tokio::spawn(
            async move {
                let outcome = this.execute(request, cache_key).await;
                this.drain().await;
                outcome
            }
            .in_current_span(),
        );

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.release_slot(id).await;
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
                Err(PipelineError::Cancelled(id))
            }
        }
    }

    /// Free the slot of a request whose task died without completing
    async fn release_slot(&self, request_id: Uuid) {
        {
            let mut state = self.inner.state.lock().await;
            if state.active.remove(&request_id).is_none() {
                return;
            }
            warn!(%request_id, "Releasing slot of aborted request");
        }
        self.inner.slot_freed.notify_one();
        self.spawn_drain();
    }

    fn spawn_drain(&self) {
        let this = self.clone();
        tokio::spawn(async move { this.drain().await }.in_current_span());
    }

    /// Run the analyzer for an admitted request and record the outcome.
    ///
    /// The request must already be in the active set.
    async fn execute(
        &self,
        request: Arc<RequestOf<A>>,
        cache_key: Option<String>,
    ) -> Result<ResultOf<A>, PipelineError> {
        let timeout = request
            .timeout
            .unwrap_or_else(|| self.inner.settings.request_timeout());
        let started = Instant::now();

        let outcome = tokio::time::timeout(
            timeout,
            self.inner.analyzer.analyze(&request.input, &request.options),
        )
        .await;

        let processing_time = started.elapsed();

        let (result, failure) = match outcome {
            Ok(Ok(payload)) => {
                let confidence = self.inner.analyzer.confidence(&payload);
                let result = AnalysisResult::success(&*request, payload, processing_time)
                    .with_confidence(confidence);
                (result, None)
            }
            Ok(Err(e)) => {
                let err = PipelineError::Analyzer {
                    request_id: request.id,
                    message: format!("{:#}", e),
                };
                let result = AnalysisResult::failure(&*request, err.to_string(), processing_time);
                (result, Some(err))
            }
            Err(_) => {
                let err = PipelineError::Timeout {
                    request_id: request.id,
                    timeout,
                };
                let result = AnalysisResult::failure(&*request, err.to_string(), processing_time);
                (result, Some(err))
            }
        };

        {
            let mut state = self.inner.state.lock().await;

            // A request no longer tracked (or whose id was re-admitted after
            // a cancel) was cancelled while running
            let tracked = state
                .active
                .get(&request.id)
                .map_or(false, |active| Arc::ptr_eq(active, &request));
            if !tracked {
                debug!(request_id = %request.id, "Discarding result of cancelled request");
                return Err(PipelineError::Cancelled(request.id));
            }
            state.active.remove(&request.id);
            self.inner.slot_freed.notify_one();

            state.history.append(result.clone());

            if result.success {
                if let Some(key) = cache_key {
                    if !state.cache.insert(key, result.clone()) {
                        debug!(request_id = %request.id, "Cache full, result not cached");
                    }
                }
            }

            let receivers = state.broadcaster.send(result.clone());
            state.metrics.record(&result);
            if matches!(failure, Some(PipelineError::Timeout { .. })) {
                state.metrics.record_timeout();
            }

            debug!(request_id = %request.id, receivers, "Result recorded");
        }

        if let Some(log) = &self.inner.result_log {
            if let Err(e) = log.append(&result).await {
                warn!(error = %e, path = %log.path().display(), "Failed to append result to log");
            }
        }

        match failure {
            None => {
                info!(
                    request_id = %request.id,
                    duration_ms = processing_time.as_millis() as u64,
                    "Request completed"
                );
                Ok(result)
            }
            Some(err) => {
                warn!(request_id = %request.id, error = %err, "Request failed");
                Err(err)
            }
        }
    }

    /// Execute queued requests while slots are free.
    ///
    /// Only one drain runs at a time; a caller finding a drain in progress
    /// returns immediately and the running drain, woken through
    /// `slot_freed`, picks up its freed slot.
    async fn drain(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if state.draining {
                return;
            }
            state.draining = true;
        }

        let mut tasks = JoinSet::new();
        let mut unfinished: HashSet<Uuid> = HashSet::new();

        loop {
            {
                let mut state = self.inner.state.lock().await;

                // Tasks that panicked never released their slot
                if tasks.is_empty() {
                    for id in unfinished.drain() {
                        if state.active.remove(&id).is_some() {
                            warn!(request_id = %id, "Releasing slot of aborted request");
                        }
                    }
                }

                state.queue.reorder();
                while state.active.has_capacity() {
                    let Some(queued) = state.queue.pop_next() else {
                        break;
                    };
                    let pending = queued.item;
                    state.active.insert(queued.id, Arc::clone(&pending.request));
                    unfinished.insert(queued.id);
                    debug!(
                        request_id = %queued.id,
                        priority = %queued.priority,
                        queue_depth = state.queue.len(),
                        "Dequeued request"
                    );

                    let this = self.clone();
                    tasks.spawn(async move {
                        let id = pending.request.id;
                        let outcome = this.execute(pending.request, pending.cache_key).await;
                        (id, outcome)
                    });
                }

                if tasks.is_empty() {
                    state.draining = false;
                    return;
                }
            }

            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((id, outcome))) => {
                        unfinished.remove(&id);
                        // Failures are already recorded; nobody is waiting on them
                        if let Err(e) = outcome {
                            debug!(request_id = %id, error = %e, "Queued request did not succeed");
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Queued request task aborted");
                    }
                    None => {}
                },
                _ = self.inner.slot_freed.notified() => {
                    debug!("Slot freed outside the drain, refilling");
                }
            }
        }
    }

    /// Cancel a queued or executing request.
    ///
    /// An executing analyzer call is not interrupted; its result is
    /// discarded when it finishes. Returns false when the request is
    /// unknown or already completed.
    pub async fn cancel(&self, request_id: Uuid) -> bool {
        let (was_queued, was_active) = {
            let mut state = self.inner.state.lock().await;
            let was_queued = state.queue.remove(&request_id).is_some();
            let was_active = state.active.remove(&request_id).is_some();
            if was_queued || was_active {
                state.metrics.record_cancelled();
            }
            (was_queued, was_active)
        };

        if !was_queued && !was_active {
            debug!(%request_id, "Nothing to cancel");
            return false;
        }

        info!(%request_id, was_queued, was_active, "Request cancelled");
        if was_active {
            // The freed slot can take a queued request right away
            self.inner.slot_freed.notify_one();
            self.spawn_drain();
        }
        true
    }

    /// Requests currently executing
    pub async fn active(&self) -> Vec<Arc<RequestOf<A>>> {
        let state = self.inner.state.lock().await;
        state.active.values().cloned().collect()
    }

    /// Number of requests waiting in the queue
    pub async fn queue_depth(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    /// Completed results, optionally only those at or after `since`
    pub async fn history(&self, since: Option<DateTime<Utc>>) -> Vec<ResultOf<A>> {
        self.inner.state.lock().await.history.since(since)
    }

    pub async fn metrics(&self) -> Metrics {
        self.inner.state.lock().await.metrics.snapshot()
    }

    /// Zero all counters. History and cache are untouched.
    pub async fn clear_metrics(&self) {
        self.inner.state.lock().await.metrics.reset();
        info!("Metrics cleared");
    }

    pub async fn clear_cache(&self) {
        self.inner.state.lock().await.cache.clear();
        info!("Cache cleared");
    }

    pub async fn cache_len(&self) -> usize {
        self.inner.state.lock().await.cache.len()
    }

    /// Attach a reader to the result stream
    pub async fn subscribe(&self) -> ResultStream<ResultOf<A>> {
        self.inner.state.lock().await.broadcaster.subscribe()
    }

    /// Close the result stream. Further results are not broadcast.
    pub async fn finish(&self) {
        self.inner.state.lock().await.broadcaster.finish();
        debug!("Result stream closed");
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.inner.state.lock().await.enabled = enabled;
        info!(enabled, "Pipeline availability changed");
    }

    pub async fn is_enabled(&self) -> bool {
        self.inner.state.lock().await.enabled
    }
}
