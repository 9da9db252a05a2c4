//! Shared test analyzer for pipeline integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use capflow::{Analyzer, Pipeline, PipelineSettings, Request};

pub type Options = BTreeMap<String, String>;

/// Analyzer that uppercases its input once the gate lets it through.
///
/// Tests hold calls at the gate to keep slots busy, then release them with
/// `release`.
#[derive(Clone)]
pub struct GatedAnalyzer {
    gate: Arc<Semaphore>,
    started: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Option<Duration>,
    fail_on: Option<String>,
}

impl GatedAnalyzer {
    /// Every call waits until released
    pub fn closed() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            started: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            delay: None,
            fail_on: None,
        }
    }

    /// Calls run straight through
    pub fn open() -> Self {
        let analyzer = Self::closed();
        analyzer.release(1 << 20);
        analyzer
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_on(mut self, input: impl Into<String>) -> Self {
        self.fail_on = Some(input.into());
        self
    }

    /// Let `n` held or future calls proceed
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Inputs in the order their analysis started
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyzer for GatedAnalyzer {
    type Input = String;
    type Options = Options;
    type Output = String;

    fn name(&self) -> &str {
        "gated"
    }

    async fn analyze(&self, input: &String, _options: &Options) -> anyhow::Result<String> {
        self.started.lock().unwrap().push(input.clone());
        self.calls.fetch_add(1, Ordering::SeqCst);

        self.gate.acquire().await?.forget();

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.as_deref() == Some(input.as_str()) {
            anyhow::bail!("cannot analyze {}", input);
        }
        Ok(input.to_uppercase())
    }

    fn confidence(&self, output: &String) -> Option<f64> {
        Some(if output.is_empty() { 0.0 } else { 1.0 })
    }
}

pub fn request(input: &str) -> Request<String, Options> {
    Request::new(input.to_string(), Options::new())
}

pub fn settings(max_concurrent: usize) -> PipelineSettings {
    PipelineSettings {
        max_concurrent,
        ..Default::default()
    }
}

/// Poll until `n` requests are executing
pub async fn wait_for_active(pipeline: &Pipeline<GatedAnalyzer>, n: usize) {
    for _ in 0..200 {
        if pipeline.active().await.len() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} active requests", n);
}

/// Poll until at least `n` analyses have started
pub async fn wait_for_started(analyzer: &GatedAnalyzer, n: usize) {
    for _ in 0..200 {
        if analyzer.started().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} started analyses, got {:?}", n, analyzer.started());
}

/// Poll until history holds `n` results
pub async fn wait_for_history(pipeline: &Pipeline<GatedAnalyzer>, n: usize) {
    for _ in 0..200 {
        if pipeline.history(None).await.len() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} results in history", n);
}
