//! Learning model registry.
//!
//! Four independent tracks, each holding at most one model: performance
//! regression, anomaly detection, usage clustering and error classification.
//! Retraining one track never touches the others. Performance numbers are
//! placeholders derived from observable statistics; the pipeline shape is
//! the contract, not the statistics.

use super::event::{unix_millis, EventKind, TelemetryEvent};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// The four training tracks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LearningTrack {
    PerformanceRegression,
    AnomalyDetection,
    UsageClustering,
    ErrorClassification,
}

impl LearningTrack {
    pub const ALL: [LearningTrack; 4] = [
        LearningTrack::PerformanceRegression,
        LearningTrack::AnomalyDetection,
        LearningTrack::UsageClustering,
        LearningTrack::ErrorClassification,
    ];

    pub fn model_name(&self) -> &'static str {
        match self {
            LearningTrack::PerformanceRegression => "performance-regression",
            LearningTrack::AnomalyDetection => "anomaly-detection",
            LearningTrack::UsageClustering => "usage-clustering",
            LearningTrack::ErrorClassification => "error-classification",
        }
    }

    fn features(&self) -> Vec<String> {
        let names: &[&str] = match self {
            LearningTrack::PerformanceRegression => {
                &["duration_ms", "batch_size", "token_usage"]
            }
            LearningTrack::AnomalyDetection => &["duration_ms", "memory_utilization"],
            LearningTrack::UsageClustering => &["event_kind", "source", "actor"],
            LearningTrack::ErrorClassification => &["error_text", "operation", "timeout"],
        };
        names.iter().map(|s| s.to_string()).collect()
    }
}

impl std::fmt::Display for LearningTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.model_name())
    }
}

/// Lifecycle of a model. Training -> Active -> (Inactive | Deprecated);
/// the only way back is an explicit retrain, which resets to Training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Training,
    Active,
    Inactive,
    Deprecated,
}

impl ModelStatus {
    pub fn can_transition_to(&self, next: ModelStatus) -> bool {
        matches!(
            (self, next),
            (ModelStatus::Training, ModelStatus::Active)
                | (ModelStatus::Active, ModelStatus::Inactive)
                | (ModelStatus::Active, ModelStatus::Deprecated)
                | (ModelStatus::Inactive, ModelStatus::Deprecated)
        )
    }
}

/// Placeholder performance numbers carried by a model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelScores {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl ModelScores {
    pub fn from_accuracy(accuracy: f64) -> Self {
        let accuracy = accuracy.clamp(0.0, 1.0);
        let precision = (accuracy * 0.97).clamp(0.0, 1.0);
        let recall = (accuracy * 0.94).clamp(0.0, 1.0);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            accuracy,
            precision,
            recall,
            f1,
        }
    }
}

/// One registered learning model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningModel {
    pub id: Uuid,
    pub name: String,
    pub track: LearningTrack,
    pub version: u32,
    pub status: ModelStatus,
    pub scores: ModelScores,
    pub features: Vec<String>,
    pub hyperparameters: BTreeMap<String, f64>,
    pub last_trained_ms: u64,
}

/// Registry holding one model per track.
pub struct ModelRegistry {
    models: Mutex<BTreeMap<LearningTrack, LearningModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<LearningTrack, LearningModel>> {
        self.models.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of all models, in track order.
    pub fn models(&self) -> Vec<LearningModel> {
        self.lock().values().cloned().collect()
    }

    pub fn get(&self, track: LearningTrack) -> Option<LearningModel> {
        self.lock().get(&track).cloned()
    }

    /// Explicit status transition; illegal moves are rejected.
    pub fn set_status(&self, track: LearningTrack, status: ModelStatus) -> Result<LearningModel> {
        let mut models = self.lock();
        let model = models.get_mut(&track).ok_or_else(|| {
            Error::InvalidInput(format!("no model registered for track '{}'", track))
        })?;
        if !model.status.can_transition_to(status) {
            return Err(Error::InvalidInput(format!(
                "illegal status transition {:?} -> {:?} for '{}'",
                model.status, status, model.name
            )));
        }
        model.status = status;
        Ok(model.clone())
    }

    /// Retrain every track from the current event history. Each track is
    /// independent: an existing model is versioned up and re-scored, a
    /// missing one is created. Returns the refreshed models in track order.
    pub fn train_all(
        &self,
        events: &[TelemetryEvent],
        feedback_accuracy: Option<f64>,
    ) -> Vec<LearningModel> {
        let stats = TrainingStats::from_events(events);
        let now = unix_millis();
        let mut models = self.lock();
        let mut trained = Vec::with_capacity(LearningTrack::ALL.len());

        for track in LearningTrack::ALL {
            let accuracy = stats.placeholder_accuracy(track, feedback_accuracy);
            let scores = ModelScores::from_accuracy(accuracy);
            let model = models
                .entry(track)
                .and_modify(|m| {
                    // Explicit retrain: the one legal way back to Training.
                    m.status = ModelStatus::Training;
                    m.version += 1;
                    m.scores = scores;
                    m.last_trained_ms = now;
                })
                .or_insert_with(|| LearningModel {
                    id: Uuid::new_v4(),
                    name: track.model_name().to_string(),
                    track,
                    version: 1,
                    status: ModelStatus::Training,
                    scores,
                    features: track.features(),
                    hyperparameters: default_hyperparameters(),
                    last_trained_ms: now,
                });
            model.status = ModelStatus::Active;
            trained.push(model.clone());
        }
        trained
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn default_hyperparameters() -> BTreeMap<String, f64> {
    let mut params = BTreeMap::new();
    params.insert("learning_rate".to_string(), 0.01);
    params.insert("window".to_string(), 100.0);
    params.insert("epochs".to_string(), 10.0);
    params
}

/// Observable statistics the placeholder scores are derived from.
struct TrainingStats {
    total: usize,
    failures: usize,
    distinct_kinds: usize,
}

impl TrainingStats {
    fn from_events(events: &[TelemetryEvent]) -> Self {
        let mut kinds: std::collections::BTreeSet<EventKind> = std::collections::BTreeSet::new();
        let mut failures = 0;
        for event in events {
            kinds.insert(event.kind);
            if event.kind.is_failure() {
                failures += 1;
            }
        }
        Self {
            total: events.len(),
            failures,
            distinct_kinds: kinds.len(),
        }
    }

    fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            1.0 - self.failures as f64 / self.total as f64
        }
    }

    fn sample_factor(&self) -> f64 {
        (self.total as f64 / 100.0).min(1.0)
    }

    fn placeholder_accuracy(&self, track: LearningTrack, feedback: Option<f64>) -> f64 {
        let base = match track {
            LearningTrack::PerformanceRegression => 0.6 + 0.35 * self.success_rate(),
            LearningTrack::AnomalyDetection => 0.6 + 0.3 * self.sample_factor(),
            LearningTrack::UsageClustering => {
                0.5 + 0.4 * (self.distinct_kinds as f64 / 11.0).min(1.0)
            }
            LearningTrack::ErrorClassification => {
                if self.failures > 0 {
                    0.55 + 0.3 * self.sample_factor()
                } else {
                    0.5
                }
            }
        };
        match (track, feedback) {
            // Ground-truth feedback only informs the regression track.
            (LearningTrack::PerformanceRegression, Some(fb)) => (base + fb) / 2.0,
            _ => base,
        }
        .clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_all_creates_four_tracks() {
        let registry = ModelRegistry::new();
        let models = registry.train_all(&[], None);
        assert_eq!(models.len(), 4);
        assert!(models.iter().all(|m| m.status == ModelStatus::Active));
        assert!(models.iter().all(|m| m.version == 1));
        let tracks: Vec<_> = models.iter().map(|m| m.track).collect();
        assert_eq!(tracks, LearningTrack::ALL.to_vec());
    }

    #[test]
    fn test_retrain_bumps_version_and_keeps_id() {
        let registry = ModelRegistry::new();
        let first = registry.train_all(&[], None);
        let second = registry.train_all(&[], Some(0.9));
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(second[0].version, 2);
    }

    #[test]
    fn test_status_transitions() {
        assert!(ModelStatus::Training.can_transition_to(ModelStatus::Active));
        assert!(ModelStatus::Active.can_transition_to(ModelStatus::Inactive));
        assert!(ModelStatus::Active.can_transition_to(ModelStatus::Deprecated));
        assert!(ModelStatus::Inactive.can_transition_to(ModelStatus::Deprecated));
        assert!(!ModelStatus::Deprecated.can_transition_to(ModelStatus::Active));
        assert!(!ModelStatus::Inactive.can_transition_to(ModelStatus::Active));
        assert!(!ModelStatus::Training.can_transition_to(ModelStatus::Deprecated));
    }

    #[test]
    fn test_set_status_enforces_legality() {
        let registry = ModelRegistry::new();
        registry.train_all(&[], None);
        registry
            .set_status(LearningTrack::UsageClustering, ModelStatus::Inactive)
            .unwrap();
        let err = registry
            .set_status(LearningTrack::UsageClustering, ModelStatus::Active)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_feedback_informs_regression_track_only() {
        let registry = ModelRegistry::new();
        let without = registry.train_all(&[], None);
        let registry2 = ModelRegistry::new();
        let with = registry2.train_all(&[], Some(0.2));
        // Low feedback accuracy drags the regression score down.
        assert!(with[0].scores.accuracy < without[0].scores.accuracy);
        // Other tracks are unaffected by feedback.
        assert!((with[1].scores.accuracy - without[1].scores.accuracy).abs() < f64::EPSILON);
    }
}
