//! 遥测与学习模块：事件采集、定时分析与模型训练。
//!
//! # Telemetry and Learning Module
//!
//! Observes every gateway operation without slowing it down. Events are
//! captured synchronously into a bounded log and processed later by a
//! background drain pass; windowed analysis turns the log into reports with
//! insights, anomalies, trends and predictions; feedback ties predictions to
//! observed outcomes; and a four-track model registry is retrained from the
//! accumulated history.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TelemetryEngine`] | Sync capture, interval drain, analysis, feedback, training |
//! | [`TelemetryEvent`] / [`EventDraft`] | The stored event and its builder |
//! | [`AnalysisReport`] | Output of one windowed analysis pass |
//! | [`LearningFeedback`] / [`FeedbackInput`] | Ground-truth intake |
//! | [`ModelRegistry`] / [`LearningModel`] | Four-track model lifecycle |
//! | [`TelemetryStore`] | Pluggable persistence for reports, feedback and models |
//!
//! ## Processing Model
//!
//! `record_event` never performs I/O; it queues work for the drain worker.
//! Each event is analyzed exactly once: the drain pass and the feedback path
//! both settle the `processed` flag, and whichever runs first wins. Analysis
//! windows use the `<integer><s|m|h|d>` grammar.

mod analysis;
mod engine;
mod event;
mod feedback;
mod registry;
mod sink;

pub use analysis::{
    AnalysisReport, Anomaly, Insight, PatternSummary, Prediction, Summary, Trend, TrendDirection,
};
pub use engine::{EngineStats, TelemetryEngine};
pub use event::{
    DerivedAnalysis, EventDetail, EventDraft, EventKind, EventMetadata, Severity, TelemetryEvent,
};
pub use feedback::{FeedbackInput, LearningFeedback};
pub use registry::{LearningModel, LearningTrack, ModelRegistry, ModelScores, ModelStatus};
pub use sink::{MemoryStore, NullStore, RecordKind, StoredRecord, TelemetryStore};
