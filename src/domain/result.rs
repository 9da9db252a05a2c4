//! Results produced when a request finishes executing.
//!
//! A result is created exactly once per executed request, on both the
//! success and the failure path, and is immutable afterwards.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request::Request;

/// Outcome of one analyzer execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult<P> {
    /// Unique identifier for this result
    pub id: Uuid,

    /// The request this result answers
    pub request_id: Uuid,

    /// Analyzer output (None when the execution failed)
    pub payload: Option<P>,

    /// Whether the analyzer succeeded
    pub success: bool,

    /// Error message if failed
    pub error: Option<String>,

    /// Time spent executing (queue wait excluded)
    pub processing_time: Duration,

    /// When execution finished
    pub timestamp: DateTime<Utc>,

    /// Confidence reported by the analyzer for the payload
    pub confidence: Option<f64>,

    /// Metadata copied from the request
    pub metadata: HashMap<String, String>,
}

impl<P> AnalysisResult<P> {
    /// Build a successful result for a request
    pub fn success<I, O>(request: &Request<I, O>, payload: P, processing_time: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id: request.id,
            payload: Some(payload),
            success: true,
            error: None,
            processing_time,
            timestamp: Utc::now(),
            confidence: None,
            metadata: request.metadata.clone(),
        }
    }

    /// Build a failed result for a request
    pub fn failure<I, O>(
        request: &Request<I, O>,
        error: impl Into<String>,
        processing_time: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id: request.id,
            payload: None,
            success: false,
            error: Some(error.into()),
            processing_time,
            timestamp: Utc::now(),
            confidence: None,
            metadata: request.metadata.clone(),
        }
    }

    /// Attach a confidence score
    pub fn with_confidence(mut self, confidence: Option<f64>) -> Self {
        self.confidence = confidence;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_result() {
        let request = Request::new("audio".to_string(), ()).with_metadata("lang", "en");
        let result = AnalysisResult::success(&request, 42u32, Duration::from_millis(15))
            .with_confidence(Some(0.8));

        assert!(result.success);
        assert_eq!(result.payload, Some(42));
        assert!(result.error.is_none());
        assert_eq!(result.request_id, request.id);
        assert_ne!(result.id, request.id);
        assert_eq!(result.confidence, Some(0.8));
        assert_eq!(result.metadata.get("lang"), Some(&"en".to_string()));
    }

    #[test]
    fn test_failure_result() {
        let request = Request::new("audio".to_string(), ());
        let result: AnalysisResult<u32> =
            AnalysisResult::failure(&request, "decoder crashed", Duration::from_millis(3));

        assert!(!result.success);
        assert!(result.payload.is_none());
        assert_eq!(result.error.as_deref(), Some("decoder crashed"));
    }

    #[test]
    fn test_result_serialization() {
        let request = Request::new("text".to_string(), ());
        let result = AnalysisResult::success(&request, "ok".to_string(), Duration::from_millis(5));

        let json = serde_json::to_string(&result).unwrap();
        let parsed: AnalysisResult<String> = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, result.id);
        assert_eq!(parsed.payload.as_deref(), Some("ok"));
        assert_eq!(parsed.processing_time, Duration::from_millis(5));
    }
}
