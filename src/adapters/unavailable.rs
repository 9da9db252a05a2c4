//! Placeholder analyzer for capabilities that are not implemented.
//!
//! Every call fails deterministically, so unfinished paths (e.g. model
//! training) still flow through the pipeline as failed results.

use std::marker::PhantomData;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use super::Analyzer;

/// Analyzer that always fails with the same reason
pub struct UnavailableAnalyzer<I, O, P> {
    name: String,
    reason: String,
    _types: PhantomData<fn(I, O) -> P>,
}

impl<I, O, P> UnavailableAnalyzer<I, O, P> {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<I, O, P> Analyzer for UnavailableAnalyzer<I, O, P>
where
    I: Serialize + Send + Sync + 'static,
    O: Serialize + Send + Sync + 'static,
    P: Clone + Serialize + Send + Sync + 'static,
{
    type Input = I;
    type Options = O;
    type Output = P;

    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, _input: &I, _options: &O) -> Result<P> {
        anyhow::bail!("{} is not available: {}", self.name, self.reason)
    }

    fn cache_key(&self, _input: &I, _options: &O) -> Option<String> {
        None
    }
}
