//! Domain types for the capflow pipeline.
//!
//! This module contains the core data structures:
//! - Request: work submitted by callers
//! - AnalysisResult: outcome of one execution
//! - Metrics: aggregated counters

pub mod metrics;
pub mod request;
pub mod result;

// Re-export commonly used types
pub use metrics::Metrics;
pub use request::{Priority, Request};
pub use result::AnalysisResult;
