//! capflow - Bounded-concurrency, priority-ordered, cached request pipeline
//!
//! Capability modules (audio analysis, image classification, predictive
//! analytics, text recognition, text-to-speech) all need the same request
//! plumbing around their domain analyzer. capflow provides it once.
//!
//! # Architecture
//!
//! A submitted request goes through:
//! - Cache check: identical requests are answered without running the analyzer
//! - Admission: execute now if a concurrency slot is free, otherwise queue
//! - Execution: the analyzer runs, raced against a timeout
//! - Completion: history, cache, broadcast and metrics are updated
//! - Drain: queued requests run in priority order as slots free up
//!
//! # Modules
//!
//! - `adapters`: The `Analyzer` trait and built-in analyzers
//! - `core`: Pipeline and its components (cache, queue, metrics, broadcast)
//! - `domain`: Data structures (Request, AnalysisResult, Metrics)
//! - `config`: Config file discovery and environment overrides
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Count bytes of every request, two at a time
//! capflow run --command wc --max-concurrent 2 -- -c < requests.jsonl
//!
//! # Show failed results from the log
//! capflow history --failed
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{Analyzer, CommandAnalyzer, UnavailableAnalyzer};
pub use core::{
    BroadcastMode, Pipeline, PipelineError, PipelineSettings, ResultLog, ResultStream,
    SettingsError,
};
pub use domain::{AnalysisResult, Metrics, Priority, Request};
