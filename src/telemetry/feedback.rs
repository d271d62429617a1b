//! Learning feedback records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ground truth supplied for a prior prediction, referenced back to its
/// event by id (weak reference, no ownership).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningFeedback {
    pub id: Uuid,
    pub event_id: Uuid,
    pub actual_outcome: f64,
    /// Prediction the accuracy was computed against; `None` when neither the
    /// caller nor the event carried one (accuracy is then 0).
    pub predicted_outcome: Option<f64>,
    /// Normalized accuracy in `[0, 1]`.
    pub accuracy: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub timestamp_ms: u64,
}

/// Caller-supplied part of a feedback submission.
#[derive(Debug, Clone, Default)]
pub struct FeedbackInput {
    pub predicted_outcome: Option<f64>,
    pub corrections: Vec<String>,
    pub rating: Option<u8>,
}

impl FeedbackInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prediction(mut self, predicted: f64) -> Self {
        self.predicted_outcome = Some(predicted);
        self
    }

    pub fn with_correction(mut self, correction: impl Into<String>) -> Self {
        self.corrections.push(correction.into());
        self
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating.min(5));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_builder_clamps_rating() {
        let input = FeedbackInput::new()
            .with_prediction(100.0)
            .with_correction("off by ten")
            .with_rating(9);
        assert_eq!(input.predicted_outcome, Some(100.0));
        assert_eq!(input.rating, Some(5));
        assert_eq!(input.corrections.len(), 1);
    }
}
