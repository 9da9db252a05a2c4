//! Analysis requests submitted to a pipeline.
//!
//! A Request is created by the caller and never mutated afterwards. The
//! pipeline shares it as `Arc<Request<_, _>>` between the queue, the active
//! set and the executing task.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scheduling priority of a request.
///
/// Totally ordered: `Low < Normal < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// A single unit of work for an analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request<I, O> {
    /// Unique identifier, generated at construction
    pub id: Uuid,

    /// Opaque domain payload (audio, image, text, data matrix)
    pub input: I,

    /// Opaque analysis configuration
    pub options: O,

    /// Scheduling priority
    pub priority: Priority,

    /// Carried unchanged into the result
    pub metadata: HashMap<String, String>,

    /// Overrides the pipeline's request timeout
    pub timeout: Option<Duration>,

    /// When the request was created
    pub created_at: DateTime<Utc>,
}

impl<I, O> Request<I, O> {
    /// Create a normal-priority request
    pub fn new(input: I, options: O) -> Self {
        Self {
            id: Uuid::new_v4(),
            input,
            options,
            priority: Priority::Normal,
            metadata: HashMap::new(),
            timeout: None,
            created_at: Utc::now(),
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set a per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Critical);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_priority_serialization() {
        let json = serde_json::to_string(&Priority::Critical).unwrap();
        assert_eq!(json, "\"critical\"");

        let parsed: Priority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(parsed, Priority::Low);
    }

    #[test]
    fn test_request_builder() {
        let request = Request::new("hello".to_string(), ())
            .with_priority(Priority::High)
            .with_metadata("source", "mic")
            .with_timeout(Duration::from_secs(2));

        assert_eq!(request.priority, Priority::High);
        assert_eq!(request.metadata.get("source"), Some(&"mic".to_string()));
        assert_eq!(request.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = Request::new(1u32, ());
        let b = Request::new(1u32, ());
        assert_ne!(a.id, b.id);
    }
}
