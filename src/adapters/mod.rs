//! Analyzer interface and the built-in analyzers.
//!
//! An analyzer performs the actual domain computation (FFT, model
//! inference, OCR, speech synthesis). The pipeline treats it as an opaque
//! async function and never retries it.

pub mod command;
pub mod unavailable;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::core::cache::generate_cache_key;

pub use command::CommandAnalyzer;
pub use unavailable::UnavailableAnalyzer;

/// Trait for domain analyzers driven by a pipeline
#[async_trait]
pub trait Analyzer: Send + Sync + 'static {
    /// Validated domain input
    type Input: Serialize + Send + Sync + 'static;

    /// Analysis configuration
    type Options: Serialize + Send + Sync + 'static;

    /// Domain result
    type Output: Clone + Serialize + Send + Sync + 'static;

    /// Human-readable analyzer name, also used to scope cache keys
    fn name(&self) -> &str;

    /// Run the analysis
    async fn analyze(&self, input: &Self::Input, options: &Self::Options) -> Result<Self::Output>;

    /// Confidence of an output, if the domain has one
    fn confidence(&self, _output: &Self::Output) -> Option<f64> {
        None
    }

    /// Cache key for an (input, options) pair. None disables caching for
    /// the request.
    fn cache_key(&self, input: &Self::Input, options: &Self::Options) -> Option<String> {
        match generate_cache_key(self.name(), input, options) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(analyzer = self.name(), error = %e, "Request is not cacheable");
                None
            }
        }
    }
}
