//! Pluggable scoring strategy.
//!
//! Two scores flow through the gateway: the diagnostic confidence attached to
//! cached responses, and the accuracy computed when feedback compares a
//! prediction against ground truth. Both are heuristics, not business logic,
//! so they live behind a trait and can be swapped without touching the cache
//! or the telemetry engine.

use crate::cache::TokenUsage;
use std::time::Duration;

/// Observable facts about one generation, fed to the confidence heuristic.
#[derive(Debug, Clone)]
pub struct ResponseSignals {
    pub content_len: usize,
    pub token_usage: TokenUsage,
    pub processing_time: Duration,
}

/// Strategy seam for confidence and accuracy scoring.
///
/// Both methods must return values clamped to `[0.0, 1.0]`.
pub trait ScoringStrategy: Send + Sync {
    /// Diagnostic confidence for a generated response. Used for ranking in
    /// cache diagnostics, never for correctness decisions.
    fn response_confidence(&self, signals: &ResponseSignals) -> f64;

    /// Accuracy of a prediction against an observed outcome.
    fn prediction_accuracy(&self, predicted: f64, actual: f64) -> f64;
}

/// Default heuristic scoring.
///
/// Confidence mixes three signals: whether the response has substance
/// (length), token efficiency (completion/prompt ratio capped at 1), and
/// speed (fast responses score higher). Accuracy is the normalized absolute
/// error against the larger magnitude, so 100 predicted vs 110 actual gives
/// roughly 0.909.
#[derive(Debug, Clone, Default)]
pub struct HeuristicScoring;

impl HeuristicScoring {
    pub fn new() -> Self {
        Self
    }
}

impl ScoringStrategy for HeuristicScoring {
    fn response_confidence(&self, signals: &ResponseSignals) -> f64 {
        let length_score = if signals.content_len >= 20 {
            1.0
        } else {
            signals.content_len as f64 / 20.0
        };

        let efficiency_score = if signals.token_usage.prompt_tokens == 0 {
            0.5
        } else {
            (signals.token_usage.completion_tokens as f64
                / signals.token_usage.prompt_tokens as f64)
                .min(1.0)
        };

        // Anything under a second is "fast"; degrade linearly up to 10s.
        let secs = signals.processing_time.as_secs_f64();
        let speed_score = if secs <= 1.0 {
            1.0
        } else {
            (1.0 - (secs - 1.0) / 9.0).max(0.0)
        };

        (0.4 * length_score + 0.3 * efficiency_score + 0.3 * speed_score).clamp(0.0, 1.0)
    }

    fn prediction_accuracy(&self, predicted: f64, actual: f64) -> f64 {
        let scale = predicted.abs().max(actual.abs());
        if scale == 0.0 {
            // Both zero: a perfect prediction.
            return 1.0;
        }
        (1.0 - (predicted - actual).abs() / scale).clamp(0.0, 1.0)
    }
}
