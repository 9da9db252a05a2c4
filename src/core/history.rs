//! In-memory history of completed results.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::domain::AnalysisResult;

/// Append-only result history with an optional bound.
///
/// When `limit` is set, the oldest results are dropped first.
#[derive(Debug)]
pub struct History<P> {
    results: VecDeque<AnalysisResult<P>>,
    limit: Option<usize>,
}

impl<P: Clone> History<P> {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            results: VecDeque::new(),
            limit,
        }
    }

    pub fn append(&mut self, result: AnalysisResult<P>) {
        self.results.push_back(result);
        if let Some(limit) = self.limit {
            while self.results.len() > limit {
                self.results.pop_front();
            }
        }
    }

    /// Results completed at or after `since` (all results when None), oldest first
    pub fn since(&self, since: Option<DateTime<Utc>>) -> Vec<AnalysisResult<P>> {
        self.results
            .iter()
            .filter(|result| since.map_or(true, |ts| result.timestamp >= ts))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
