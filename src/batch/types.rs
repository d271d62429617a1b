//! Queue entries, replies and the dispatch seam.

use crate::cache::TokenUsage;
use crate::runtime::GenerateOptions;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Dispatch priority. Within one model's batch, higher priorities run first;
/// equal priorities keep submission order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generation request waiting in the queue.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub id: Uuid,
    pub model: String,
    pub prompt: String,
    pub options: GenerateOptions,
    pub priority: Priority,
    /// Cache TTL override the dispatcher should apply to this response.
    pub cache_ttl: Option<Duration>,
    pub submitted_at: Instant,
}

impl BatchRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: model.into(),
            prompt: prompt.into(),
            options: GenerateOptions::default(),
            priority: Priority::default(),
            cache_ttl: None,
            submitted_at: Instant::now(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Time spent queued so far.
    pub fn queue_age(&self) -> Duration {
        self.submitted_at.elapsed()
    }
}

/// What the dispatcher produced for one request.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub content: String,
    pub usage: TokenUsage,
    /// The response came out of the cache at dispatch time, typically because
    /// an identical request earlier in the same batch populated it.
    pub served_from_cache: bool,
}

/// Reply delivered to the submitter once its request was dispatched.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    pub id: Uuid,
    pub model: String,
    pub content: String,
    pub usage: TokenUsage,
    pub processing_time_ms: u64,
    pub served_from_cache: bool,
    /// Size of the chunk this request was dispatched in.
    pub batch_size: usize,
}

/// Executes a single request on behalf of the scheduler. The scheduler owns
/// ordering and grouping; the dispatcher owns what "execute" means.
#[async_trait]
pub trait BatchDispatcher: Send + Sync {
    async fn dispatch(&self, request: &BatchRequest) -> Result<BatchOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_priority_serialized_lowercase() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
        let parsed: Priority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(parsed, Priority::Low);
    }

    #[test]
    fn test_request_builder() {
        let request = BatchRequest::new("llama3", "hello").with_priority(Priority::High);
        assert_eq!(request.model, "llama3");
        assert_eq!(request.priority, Priority::High);
        assert!(request.options.is_empty());
    }
}
