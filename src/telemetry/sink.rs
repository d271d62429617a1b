//! Persistence collaborator for derived telemetry artifacts.
//!
//! Reports, feedback records and trained models may be persisted by an
//! external store. The engine only needs an append/query contract; store
//! failures are logged and counted, never propagated into the pipeline.

use super::analysis::AnalysisReport;
use super::feedback::LearningFeedback;
use super::registry::LearningModel;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Which family of record a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Report,
    Feedback,
    Model,
}

/// One persisted artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum StoredRecord {
    Report(AnalysisReport),
    Feedback(LearningFeedback),
    Model(LearningModel),
}

impl StoredRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            StoredRecord::Report(_) => RecordKind::Report,
            StoredRecord::Feedback(_) => RecordKind::Feedback,
            StoredRecord::Model(_) => RecordKind::Model,
        }
    }
}

/// Append/query seam for an external persistence store.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn append(&self, record: StoredRecord) -> Result<()>;

    /// Most recent `limit` records of one kind, newest first.
    async fn query(&self, kind: RecordKind, limit: usize) -> Result<Vec<StoredRecord>>;

    fn name(&self) -> &'static str;
}

/// Bounded in-memory store. The default for tests and single-process
/// deployments; oldest records fall off past capacity.
pub struct MemoryStore {
    records: Mutex<VecDeque<StoredRecord>>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<StoredRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn append(&self, record: StoredRecord) -> Result<()> {
        let mut records = self.lock();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }

    async fn query(&self, kind: RecordKind, limit: usize) -> Result<Vec<StoredRecord>> {
        Ok(self
            .lock()
            .iter()
            .rev()
            .filter(|r| r.kind() == kind)
            .take(limit)
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Discards everything.
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryStore for NullStore {
    async fn append(&self, _: StoredRecord) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _: RecordKind, _: usize) -> Result<Vec<StoredRecord>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::feedback::LearningFeedback;
    use uuid::Uuid;

    fn feedback_record(accuracy: f64) -> StoredRecord {
        StoredRecord::Feedback(LearningFeedback {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            actual_outcome: 1.0,
            predicted_outcome: Some(1.0),
            accuracy,
            corrections: Vec::new(),
            rating: None,
            timestamp_ms: 0,
        })
    }

    #[tokio::test]
    async fn test_memory_store_bounded_and_newest_first() {
        let store = MemoryStore::new(2);
        store.append(feedback_record(0.1)).await.unwrap();
        store.append(feedback_record(0.2)).await.unwrap();
        store.append(feedback_record(0.3)).await.unwrap();
        assert_eq!(store.len(), 2);

        let records = store.query(RecordKind::Feedback, 10).await.unwrap();
        match &records[0] {
            StoredRecord::Feedback(f) => assert!((f.accuracy - 0.3).abs() < f64::EPSILON),
            _ => panic!("expected feedback record"),
        }
    }

    #[test]
    fn test_query_filters_by_kind() {
        tokio_test::block_on(async {
            let store = MemoryStore::new(10);
            store.append(feedback_record(0.5)).await.unwrap();
            assert!(store.query(RecordKind::Report, 10).await.unwrap().is_empty());
            assert_eq!(store.query(RecordKind::Feedback, 10).await.unwrap().len(), 1);
        });
    }

    #[test]
    fn test_null_store_discards_everything() {
        tokio_test::block_on(async {
            let store = NullStore;
            store.append(feedback_record(0.5)).await.unwrap();
            assert!(store.query(RecordKind::Feedback, 10).await.unwrap().is_empty());
        });
    }
}
