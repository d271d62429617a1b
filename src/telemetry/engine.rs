//! Telemetry engine: synchronous capture, deferred processing.
//!
//! `record_event` is the hot-path entry point and never blocks on I/O: it
//! stamps the draft, appends it to the bounded in-memory log and queues the
//! id for the next drain pass. A background worker drains the queue on an
//! interval, runs the per-event analysis exactly once per event and flips the
//! `processed` flag. Overlapping drains are collapsed: if a pass is already
//! running, the next caller returns immediately instead of waiting.
//!
//! Windowed analysis, feedback intake and model training are pull-based and
//! async; persistence failures in the external store are counted and logged
//! but never surface to callers.

use super::analysis::{build_report, parse_window, AnalysisReport};
use super::event::{
    unix_millis, DerivedAnalysis, EventDetail, EventDraft, EventKind, EventMetadata, Severity,
    TelemetryEvent,
};
use super::feedback::{FeedbackInput, LearningFeedback};
use super::registry::{LearningModel, ModelRegistry};
use super::sink::{StoredRecord, TelemetryStore};
use crate::config::EngineConfig;
use crate::metrics::MetricsSource;
use crate::scoring::ScoringStrategy;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Counter snapshot; `pending` is read live from the queue.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EngineStats {
    pub recorded: u64,
    pub processed: u64,
    pub pending: usize,
    pub drains: u64,
    pub analysis_failures: u64,
    pub feedback_count: u64,
    pub store_failures: u64,
    /// Events evicted from the bounded log before being read back.
    pub dropped: u64,
}

#[derive(Default)]
struct AtomicEngineStats {
    recorded: AtomicU64,
    processed: AtomicU64,
    drains: AtomicU64,
    analysis_failures: AtomicU64,
    feedback_count: AtomicU64,
    store_failures: AtomicU64,
    dropped: AtomicU64,
}

impl AtomicEngineStats {
    fn to_stats(&self, pending: usize) -> EngineStats {
        EngineStats {
            recorded: self.recorded.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            pending,
            drains: self.drains.load(Ordering::Relaxed),
            analysis_failures: self.analysis_failures.load(Ordering::Relaxed),
            feedback_count: self.feedback_count.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Event capture and learning pipeline shared across the gateway.
pub struct TelemetryEngine {
    config: EngineConfig,
    environment: String,
    instance_id: String,
    log: RwLock<VecDeque<TelemetryEvent>>,
    pending: Mutex<VecDeque<Uuid>>,
    /// Held for the duration of one drain pass; `try_lock` makes overlapping
    /// passes a no-op instead of a queue.
    drain_gate: tokio::sync::Mutex<()>,
    metrics: Arc<dyn MetricsSource>,
    scoring: Arc<dyn ScoringStrategy>,
    store: Arc<dyn TelemetryStore>,
    registry: ModelRegistry,
    feedback: RwLock<Vec<LearningFeedback>>,
    stats: AtomicEngineStats,
}

impl TelemetryEngine {
    pub fn new(
        config: EngineConfig,
        metrics: Arc<dyn MetricsSource>,
        scoring: Arc<dyn ScoringStrategy>,
        store: Arc<dyn TelemetryStore>,
    ) -> Self {
        Self {
            config,
            environment: "development".to_string(),
            instance_id: String::new(),
            log: RwLock::new(VecDeque::new()),
            pending: Mutex::new(VecDeque::new()),
            drain_gate: tokio::sync::Mutex::new(()),
            metrics,
            scoring,
            store,
            registry: ModelRegistry::new(),
            feedback: RwLock::new(Vec::new()),
            stats: AtomicEngineStats::default(),
        }
    }

    /// Deployment context stamped onto every event.
    pub fn with_context(
        mut self,
        environment: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        self.environment = environment.into();
        self.instance_id = instance_id.into();
        self
    }

    fn log_read(&self) -> RwLockReadGuard<'_, VecDeque<TelemetryEvent>> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_write(&self) -> RwLockWriteGuard<'_, VecDeque<TelemetryEvent>> {
        self.log.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending_lock(&self) -> MutexGuard<'_, VecDeque<Uuid>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn feedback_read(&self) -> RwLockReadGuard<'_, Vec<LearningFeedback>> {
        self.feedback.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn feedback_write(&self) -> RwLockWriteGuard<'_, Vec<LearningFeedback>> {
        self.feedback.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one event. Synchronous and lock-bounded; safe to call from
    /// request handlers. Returns the stored event as stamped.
    pub fn record_event(&self, draft: EventDraft) -> TelemetryEvent {
        let event = TelemetryEvent {
            id: Uuid::new_v4(),
            timestamp_ms: unix_millis(),
            kind: draft.detail.kind(),
            source: draft.source,
            actors: draft.actors,
            detail: draft.detail,
            duration_ms: draft.duration.map(|d| d.as_millis() as u64),
            resources: Some(self.metrics.sample()),
            metadata: EventMetadata {
                environment: self.environment.clone(),
                instance_id: self.instance_id.clone(),
                tags: draft.tags,
            },
            derived: None,
            confidence: 1.0,
            processed: false,
        };
        {
            let mut log = self.log_write();
            if log.len() >= self.config.history_limit {
                log.pop_front();
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            log.push_back(event.clone());
        }
        self.pending_lock().push_back(event.id);
        self.stats.recorded.fetch_add(1, Ordering::Relaxed);
        trace!(kind = %event.kind, source = %event.source, "telemetry event recorded");
        event
    }

    /// One drain pass: takes up to `drain_batch_size` queued ids and runs the
    /// per-event analysis on each. Returns how many events were processed.
    /// A pass already in flight makes this call return 0 immediately.
    pub async fn process_pending(&self) -> usize {
        let _gate = match self.drain_gate.try_lock() {
            Ok(gate) => gate,
            Err(_) => return 0,
        };
        self.stats.drains.fetch_add(1, Ordering::Relaxed);

        let batch: Vec<Uuid> = {
            let mut pending = self.pending_lock();
            let take = pending.len().min(self.config.drain_batch_size);
            pending.drain(..take).collect()
        };
        if batch.is_empty() {
            return 0;
        }

        let mut processed = 0usize;
        {
            let mut log = self.log_write();
            for id in batch {
                // Ids whose events were evicted from the bounded log, or
                // already settled through feedback, are skipped.
                if let Some(event) = log.iter_mut().find(|e| e.id == id) {
                    if event.processed {
                        continue;
                    }
                    let derived = self.analyze_event(event);
                    event.confidence = confidence_for(derived.severity);
                    event.derived = Some(derived);
                    event.processed = true;
                    processed += 1;
                }
            }
        }
        self.stats
            .processed
            .fetch_add(processed as u64, Ordering::Relaxed);
        debug!(processed, "telemetry drain pass complete");
        processed
    }

    /// Per-event severity pass. Infallible: it only inspects what the event
    /// already carries.
    fn analyze_event(&self, event: &TelemetryEvent) -> DerivedAnalysis {
        let mut severity = Severity::Info;
        let mut observations = Vec::new();

        if let Some(duration) = event.duration_ms {
            if duration > self.config.slow_threshold_ms {
                severity = severity.max(Severity::Warning);
                observations.push(format!(
                    "duration {}ms exceeds the {}ms slow threshold",
                    duration, self.config.slow_threshold_ms
                ));
            }
        }
        if let Some(resources) = &event.resources {
            let utilization = resources.utilization();
            if utilization > self.config.resource_threshold {
                severity = severity.max(Severity::Warning);
                observations.push(format!(
                    "memory utilization {:.0}% above the {:.0}% threshold",
                    utilization * 100.0,
                    self.config.resource_threshold * 100.0
                ));
            }
        }
        if event.kind == EventKind::PolicyRejected {
            severity = severity.max(Severity::Warning);
            observations.push("request rejected by policy".to_string());
        }
        if event.kind.is_failure() {
            severity = Severity::Critical;
            observations.push(format!("{} outcome", event.kind));
        }

        DerivedAnalysis {
            severity,
            observations,
        }
    }

    /// Periodic drain worker. Runs until the handle is aborted.
    pub fn spawn_worker(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.drain_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.process_pending().await;
            }
        })
    }

    /// Periodic training worker, if a training interval is configured.
    pub fn spawn_training_worker(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let interval = self.config.training_interval()?;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; training waits a full period.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.train_models().await;
            }
        }))
    }

    /// Analyzes the events inside `window` ("90s", "5m", "2h", "1d") and
    /// returns the report. A malformed window is itself recorded as an
    /// analysis-failure event before the error is returned.
    pub async fn analyze(&self, window: &str) -> Result<AnalysisReport> {
        let duration = match parse_window(window) {
            Ok(duration) => duration,
            Err(err) => {
                self.stats.analysis_failures.fetch_add(1, Ordering::Relaxed);
                self.record_event(EventDraft::new(
                    "telemetry",
                    EventDetail::AnalysisFailure {
                        stage: "window_parse".to_string(),
                        error: err.to_string(),
                    },
                ));
                return Err(err);
            }
        };

        let cutoff = unix_millis().saturating_sub(duration.as_millis() as u64);
        let events: Vec<TelemetryEvent> = {
            let log = self.log_read();
            log.iter()
                .filter(|e| e.timestamp_ms >= cutoff)
                .cloned()
                .collect()
        };
        let report = build_report(window.trim(), &events, &self.config);
        debug!(
            window = %report.summary.window,
            events = report.summary.total_events,
            "analysis pass complete"
        );
        self.persist(StoredRecord::Report(report.clone())).await;
        Ok(report)
    }

    /// Registers ground truth for a recorded event. The prediction comes
    /// from `input` when given, otherwise from the event's
    /// `predicted_outcome` tag; with neither, accuracy is 0. Feedback settles
    /// the event, so a later drain pass leaves it alone.
    pub async fn provide_feedback(
        &self,
        event_id: Uuid,
        actual_outcome: f64,
        input: FeedbackInput,
    ) -> Result<LearningFeedback> {
        let (predicted, newly_settled) = {
            let mut log = self.log_write();
            let event = log.iter_mut().find(|e| e.id == event_id).ok_or_else(|| {
                Error::Analysis(format!("unknown event id {}", event_id))
            })?;
            let predicted = input.predicted_outcome.or_else(|| {
                event
                    .metadata
                    .tags
                    .get("predicted_outcome")
                    .and_then(|v| v.parse().ok())
            });
            let newly_settled = !event.processed;
            event.processed = true;
            (predicted, newly_settled)
        };
        if newly_settled {
            self.stats.processed.fetch_add(1, Ordering::Relaxed);
        }

        let accuracy = predicted
            .map(|p| self.scoring.prediction_accuracy(p, actual_outcome))
            .unwrap_or(0.0);
        let feedback = LearningFeedback {
            id: Uuid::new_v4(),
            event_id,
            actual_outcome,
            predicted_outcome: predicted,
            accuracy,
            corrections: input.corrections,
            rating: input.rating,
            timestamp_ms: unix_millis(),
        };
        self.feedback_write().push(feedback.clone());
        self.stats.feedback_count.fetch_add(1, Ordering::Relaxed);

        self.record_event(EventDraft::new(
            "telemetry",
            EventDetail::Feedback { event_id, accuracy },
        ));
        self.persist(StoredRecord::Feedback(feedback.clone())).await;
        Ok(feedback)
    }

    /// Retrains all four learning tracks from the current log and feedback
    /// history, then persists the refreshed models.
    pub async fn train_models(&self) -> Vec<LearningModel> {
        let events: Vec<TelemetryEvent> = self.log_read().iter().cloned().collect();
        let feedback_mean = {
            let history = self.feedback_read();
            if history.is_empty() {
                None
            } else {
                Some(history.iter().map(|f| f.accuracy).sum::<f64>() / history.len() as f64)
            }
        };
        let models = self.registry.train_all(&events, feedback_mean);
        self.record_event(EventDraft::new(
            "telemetry",
            EventDetail::Training {
                models_trained: models.len(),
            },
        ));
        for model in &models {
            self.persist(StoredRecord::Model(model.clone())).await;
        }
        debug!(models = models.len(), "training pass complete");
        models
    }

    /// Store appends must never fail a caller; failures are counted.
    async fn persist(&self, record: StoredRecord) {
        if let Err(err) = self.store.append(record).await {
            self.stats.store_failures.fetch_add(1, Ordering::Relaxed);
            warn!(store = self.store.name(), error = %err, "telemetry store append failed");
        }
    }

    /// Most recent events, newest first.
    pub fn events(&self, limit: usize) -> Vec<TelemetryEvent> {
        self.log_read().iter().rev().take(limit).cloned().collect()
    }

    pub fn event(&self, id: Uuid) -> Option<TelemetryEvent> {
        self.log_read().iter().find(|e| e.id == id).cloned()
    }

    pub fn pending_len(&self) -> usize {
        self.pending_lock().len()
    }

    pub fn feedback_history(&self) -> Vec<LearningFeedback> {
        self.feedback_read().clone()
    }

    pub fn models(&self) -> Vec<LearningModel> {
        self.registry.models()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.to_stats(self.pending_len())
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }
}

fn confidence_for(severity: Severity) -> f64 {
    match severity {
        Severity::Info => 1.0,
        Severity::Warning => 0.7,
        Severity::Critical => 0.4,
    }
}
