//! Errors returned to callers of `Pipeline::submit`.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Pipeline submission errors.
///
/// `Queued` is not a failure: it tells the caller the request was accepted
/// but deferred, and its result will only surface through the result stream
/// and history.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Pipeline is disabled")]
    Disabled,

    #[error("Request {0} queued for deferred execution")]
    Queued(Uuid),

    #[error("Request {request_id} timed out after {timeout:?}")]
    Timeout { request_id: Uuid, timeout: Duration },

    #[error("Analyzer failed for request {request_id}: {message}")]
    Analyzer { request_id: Uuid, message: String },

    #[error("Queue is full (max: {max_queue_depth})")]
    CapacityExceeded { max_queue_depth: usize },

    #[error("Request {0} was cancelled")]
    Cancelled(Uuid),

    #[error("Request {0} is already queued or executing")]
    Duplicate(Uuid),
}

impl PipelineError {
    /// Whether this only signals deferred execution
    pub fn is_queued(&self) -> bool {
        matches!(self, PipelineError::Queued(_))
    }

    /// The request this error refers to, if any
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            PipelineError::Queued(id)
            | PipelineError::Cancelled(id)
            | PipelineError::Duplicate(id) => Some(*id),
            PipelineError::Timeout { request_id, .. } | PipelineError::Analyzer { request_id, .. } => {
                Some(*request_id)
            }
            PipelineError::Disabled | PipelineError::CapacityExceeded { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queued_is_not_a_failure() {
        let id = Uuid::new_v4();
        let err = PipelineError::Queued(id);
        assert!(err.is_queued());
        assert_eq!(err.request_id(), Some(id));
        assert!(!PipelineError::Disabled.is_queued());
    }

    #[test]
    fn test_error_messages() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let err = PipelineError::Timeout {
            request_id: id,
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "Request 550e8400-e29b-41d4-a716-446655440000 timed out after 250ms"
        );

        let err = PipelineError::CapacityExceeded { max_queue_depth: 4 };
        assert_eq!(err.to_string(), "Queue is full (max: 4)");
        assert_eq!(err.request_id(), None);
    }
}
