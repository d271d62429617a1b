//! Telemetry event model.
//!
//! Every observed operation becomes a [`TelemetryEvent`]. The payload is a
//! tagged union per category rather than free-form JSON, with a string tag
//! map on the envelope for extensibility. An event is immutable once
//! recorded except for `processed`, `derived` and `confidence`, which the
//! engine sets exactly once during the drain pass.

use crate::cache::TokenUsage;
use crate::metrics::ResourceUsage;
use crate::runtime::HealthStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Event classification. Success, blocked-by-policy and error outcomes are
/// distinct kinds so analysis can separate infrastructure failures from
/// policy rejections.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CacheHit,
    CacheMiss,
    Generation,
    BatchDispatch,
    HealthProbe,
    PolicyRejected,
    Timeout,
    RuntimeFailure,
    Feedback,
    Training,
    AnalysisFailure,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CacheHit => "cache_hit",
            EventKind::CacheMiss => "cache_miss",
            EventKind::Generation => "generation",
            EventKind::BatchDispatch => "batch_dispatch",
            EventKind::HealthProbe => "health_probe",
            EventKind::PolicyRejected => "policy_rejected",
            EventKind::Timeout => "timeout",
            EventKind::RuntimeFailure => "runtime_failure",
            EventKind::Feedback => "feedback",
            EventKind::Training => "training",
            EventKind::AnalysisFailure => "analysis_failure",
        }
    }

    /// Kinds counted into the error rate.
    pub fn is_failure(&self) -> bool {
        matches!(self, EventKind::Timeout | EventKind::RuntimeFailure)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category payload. Each variant implies exactly one [`EventKind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum EventDetail {
    CacheAccess {
        model: String,
        key: String,
        hit: bool,
    },
    Generation {
        model: String,
        prompt_chars: usize,
        content_chars: usize,
        usage: TokenUsage,
        batched: bool,
        /// `Some` when the generation was streamed; counts decoded chunks.
        stream_chunks: Option<usize>,
    },
    BatchDispatch {
        request_id: Uuid,
        model: String,
        batch_size: usize,
        served_from_cache: bool,
    },
    HealthProbe {
        status: HealthStatus,
        latency_ms: Option<u64>,
        consecutive_failures: u32,
    },
    PolicyRejected {
        model: String,
        violations: Vec<String>,
    },
    Failure {
        operation: String,
        model: String,
        error: String,
        timeout: bool,
    },
    Feedback {
        event_id: Uuid,
        accuracy: f64,
    },
    Training {
        models_trained: usize,
    },
    AnalysisFailure {
        stage: String,
        error: String,
    },
}

impl EventDetail {
    pub fn kind(&self) -> EventKind {
        match self {
            EventDetail::CacheAccess { hit: true, .. } => EventKind::CacheHit,
            EventDetail::CacheAccess { hit: false, .. } => EventKind::CacheMiss,
            EventDetail::Generation { .. } => EventKind::Generation,
            EventDetail::BatchDispatch { .. } => EventKind::BatchDispatch,
            EventDetail::HealthProbe { .. } => EventKind::HealthProbe,
            EventDetail::PolicyRejected { .. } => EventKind::PolicyRejected,
            EventDetail::Failure { timeout: true, .. } => EventKind::Timeout,
            EventDetail::Failure { timeout: false, .. } => EventKind::RuntimeFailure,
            EventDetail::Feedback { .. } => EventKind::Feedback,
            EventDetail::Training { .. } => EventKind::Training,
            EventDetail::AnalysisFailure { .. } => EventKind::AnalysisFailure,
        }
    }
}

/// Deployment context stamped onto every event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    pub environment: String,
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Flag level assigned by the per-event analysis pass.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// What the drain pass concluded about one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedAnalysis {
    pub severity: Severity,
    pub observations: Vec<String>,
}

/// One observed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub id: Uuid,
    pub timestamp_ms: u64,
    pub kind: EventKind,
    /// Subsystem that produced the event ("gateway", "cache", "batch", ...).
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actors: Vec<String>,
    pub detail: EventDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceUsage>,
    pub metadata: EventMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived: Option<DerivedAnalysis>,
    pub confidence: f64,
    pub processed: bool,
}

/// Builder for the caller-supplied part of an event; the engine stamps id,
/// timestamp, kind, resource sample and deployment metadata at record time.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub source: String,
    pub detail: EventDetail,
    pub actors: Vec<String>,
    pub duration: Option<Duration>,
    pub tags: BTreeMap<String, String>,
}

impl EventDraft {
    pub fn new(source: impl Into<String>, detail: EventDetail) -> Self {
        Self {
            source: source.into(),
            detail,
            actors: Vec::new(),
            duration: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actors.push(actor.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}
