//! Windowed analysis over the event log.
//!
//! Everything here is pure: the engine hands in the events that fall inside
//! the requested window and gets a report back. Window labels follow the
//! `<integer><unit>` grammar with `s`, `m`, `h` and `d` units ("90s", "1h").
//! The heuristics are deliberately simple and threshold-driven; they are
//! tuned through [`EngineConfig`], not code changes.

use super::event::{unix_millis, EventKind, TelemetryEvent};
use crate::config::EngineConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Parses a window label into a duration.
pub(crate) fn parse_window(label: &str) -> Result<Duration> {
    let label = label.trim();
    if label.len() < 2 {
        return Err(Error::Analysis(format!(
            "invalid analysis window '{}': expected <integer><s|m|h|d>",
            label
        )));
    }
    let (value, unit) = label.split_at(label.len() - 1);
    let value: u64 = value.parse().map_err(|_| {
        Error::Analysis(format!(
            "invalid analysis window '{}': '{}' is not an integer",
            label, value
        ))
    })?;
    if value == 0 {
        return Err(Error::Analysis(format!(
            "invalid analysis window '{}': duration must be positive",
            label
        )));
    }
    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3_600,
        "d" => value * 86_400,
        other => {
            return Err(Error::Analysis(format!(
                "invalid analysis window '{}': unknown unit '{}'",
                label, other
            )))
        }
    };
    Ok(Duration::from_secs(seconds))
}

/// A human-readable finding derived from the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub confidence: f64,
}

/// Per-kind frequency summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSummary {
    pub id: Uuid,
    pub kind: EventKind,
    pub count: usize,
    /// True once the kind crosses the configured minimum count.
    pub frequent: bool,
    pub confidence: f64,
}

/// An event whose duration stands out from the window mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: Uuid,
    pub event_id: Uuid,
    pub kind: EventKind,
    pub duration_ms: u64,
    pub mean_duration_ms: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Flat,
}

/// First-half versus second-half movement of a metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    pub id: Uuid,
    pub metric: String,
    pub direction: TrendDirection,
    pub slope: f64,
    pub confidence: f64,
}

/// Naive short-horizon forecast for a metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub metric: String,
    pub current_mean: f64,
    pub predicted: f64,
    pub confidence: f64,
}

/// Aggregate counters for the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub window: String,
    pub total_events: usize,
    pub counts: BTreeMap<EventKind, usize>,
    pub error_rate: f64,
    pub average_confidence: f64,
    /// 1.0 minus the share of events slower than the configured threshold.
    pub performance_score: f64,
}

/// The full output of one analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: Uuid,
    pub generated_at_ms: u64,
    pub summary: Summary,
    pub insights: Vec<Insight>,
    pub patterns: Vec<PatternSummary>,
    pub anomalies: Vec<Anomaly>,
    pub trends: Vec<Trend>,
    pub predictions: Vec<Prediction>,
    pub recommendations: Vec<String>,
    pub actions: Vec<String>,
}

/// Builds a report from the events inside one window. The slice is expected
/// to be in log order (oldest first); trends rely on that.
pub(crate) fn build_report(
    window: &str,
    events: &[TelemetryEvent],
    config: &EngineConfig,
) -> AnalysisReport {
    let total = events.len();
    let mut counts: BTreeMap<EventKind, usize> = BTreeMap::new();
    let mut failures = 0usize;
    let mut slow = 0usize;
    let mut confidence_sum = 0.0;
    let mut durations: Vec<(Uuid, EventKind, u64)> = Vec::new();

    for event in events {
        *counts.entry(event.kind).or_insert(0) += 1;
        if event.kind.is_failure() {
            failures += 1;
        }
        confidence_sum += event.confidence;
        if let Some(duration) = event.duration_ms {
            if duration > config.slow_threshold_ms {
                slow += 1;
            }
            durations.push((event.id, event.kind, duration));
        }
    }

    let error_rate = ratio(failures, total);
    let slow_share = ratio(slow, total);
    let summary = Summary {
        window: window.to_string(),
        total_events: total,
        counts,
        error_rate,
        average_confidence: if total == 0 {
            0.0
        } else {
            confidence_sum / total as f64
        },
        performance_score: 1.0 - slow_share,
    };

    let insights = build_insights(error_rate, slow_share, config);
    let patterns = build_patterns(&summary.counts, total, config);
    let anomalies = build_anomalies(&durations);
    let trends = build_trends(&durations);
    let predictions = build_predictions(&durations);
    let (recommendations, actions) = build_followups(&insights, &anomalies);

    AnalysisReport {
        id: Uuid::new_v4(),
        generated_at_ms: unix_millis(),
        summary,
        insights,
        patterns,
        anomalies,
        trends,
        predictions,
        recommendations,
        actions,
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn build_insights(error_rate: f64, slow_share: f64, config: &EngineConfig) -> Vec<Insight> {
    let mut insights = Vec::new();
    if slow_share > 0.2 {
        insights.push(Insight {
            id: Uuid::new_v4(),
            title: "slow operations dominate".to_string(),
            description: format!(
                "{:.0}% of events exceeded the {}ms threshold",
                slow_share * 100.0,
                config.slow_threshold_ms
            ),
            confidence: 0.5 + slow_share * 0.45,
        });
    }
    if error_rate > 0.05 {
        insights.push(Insight {
            id: Uuid::new_v4(),
            title: "elevated failure rate".to_string(),
            description: format!(
                "{:.1}% of events were timeouts or runtime failures",
                error_rate * 100.0
            ),
            confidence: 0.5 + error_rate * 0.45,
        });
    }
    insights
}

fn build_patterns(
    counts: &BTreeMap<EventKind, usize>,
    total: usize,
    config: &EngineConfig,
) -> Vec<PatternSummary> {
    counts
        .iter()
        .map(|(kind, count)| PatternSummary {
            id: Uuid::new_v4(),
            kind: *kind,
            count: *count,
            frequent: *count >= config.pattern_min_count,
            confidence: ratio(*count, total),
        })
        .collect()
}

fn build_anomalies(durations: &[(Uuid, EventKind, u64)]) -> Vec<Anomaly> {
    let mean = mean(durations.iter().map(|(_, _, d)| *d as f64));
    if mean <= 0.0 {
        return Vec::new();
    }
    durations
        .iter()
        .filter(|(_, _, duration)| *duration as f64 > 2.0 * mean)
        .map(|(event_id, kind, duration)| Anomaly {
            id: Uuid::new_v4(),
            event_id: *event_id,
            kind: *kind,
            duration_ms: *duration,
            mean_duration_ms: mean,
            confidence: (1.0 - 2.0 * mean / *duration as f64).clamp(0.05, 0.95),
        })
        .collect()
}

fn build_trends(durations: &[(Uuid, EventKind, u64)]) -> Vec<Trend> {
    // Two samples per half is the floor for a meaningful comparison.
    if durations.len() < 4 {
        return Vec::new();
    }
    let mid = durations.len() / 2;
    let first = mean(durations[..mid].iter().map(|(_, _, d)| *d as f64));
    let second = mean(durations[mid..].iter().map(|(_, _, d)| *d as f64));
    if first <= 0.0 {
        return Vec::new();
    }
    let direction = if second > first * 1.05 {
        TrendDirection::Rising
    } else if second < first * 0.95 {
        TrendDirection::Falling
    } else {
        TrendDirection::Flat
    };
    let relative = (second - first).abs() / first;
    let confidence = match direction {
        TrendDirection::Flat => 0.4,
        _ => (0.4 + relative).min(0.9),
    };
    vec![Trend {
        id: Uuid::new_v4(),
        metric: "duration_ms".to_string(),
        direction,
        slope: second - first,
        confidence,
    }]
}

fn build_predictions(durations: &[(Uuid, EventKind, u64)]) -> Vec<Prediction> {
    if durations.is_empty() {
        return Vec::new();
    }
    let current = mean(durations.iter().map(|(_, _, d)| *d as f64));
    vec![Prediction {
        id: Uuid::new_v4(),
        metric: "duration_ms".to_string(),
        current_mean: current,
        predicted: current * 1.1,
        confidence: 0.3 + (durations.len() as f64 / 50.0).min(1.0) * 0.5,
    }]
}

fn build_followups(insights: &[Insight], anomalies: &[Anomaly]) -> (Vec<String>, Vec<String>) {
    let mut recommendations = Vec::new();
    let mut actions = Vec::new();
    for insight in insights {
        match insight.title.as_str() {
            "slow operations dominate" => {
                recommendations
                    .push("Review generation latency against the slow threshold.".to_string());
                actions.push("Profile the slowest model pipelines.".to_string());
            }
            "elevated failure rate" => {
                recommendations
                    .push("Inspect recent timeouts and runtime failures.".to_string());
                actions.push("Check inference runtime health and connectivity.".to_string());
            }
            _ => {}
        }
    }
    if !anomalies.is_empty() {
        recommendations.push(format!(
            "Investigate {} outlier event(s) with unusual durations.",
            anomalies.len()
        ));
    }
    if recommendations.is_empty() {
        recommendations.push("No action required.".to_string());
    }
    (recommendations, actions)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values {
        sum += value;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::super::event::EventDetail;
    use super::*;

    fn event_with_duration(duration_ms: u64) -> TelemetryEvent {
        draft_event(
            EventDetail::Generation {
                model: "llama3".to_string(),
                prompt_chars: 10,
                content_chars: 20,
                usage: crate::cache::TokenUsage::new(5, 10),
                batched: false,
                stream_chunks: None,
            },
            Some(duration_ms),
        )
    }

    fn failure_event() -> TelemetryEvent {
        draft_event(
            EventDetail::Failure {
                operation: "generate".to_string(),
                model: "llama3".to_string(),
                error: "boom".to_string(),
                timeout: false,
            },
            Some(10),
        )
    }

    fn draft_event(detail: EventDetail, duration_ms: Option<u64>) -> TelemetryEvent {
        let kind = detail.kind();
        TelemetryEvent {
            id: Uuid::new_v4(),
            timestamp_ms: unix_millis(),
            kind,
            source: "test".to_string(),
            actors: Vec::new(),
            detail,
            duration_ms,
            resources: None,
            metadata: Default::default(),
            derived: None,
            confidence: 1.0,
            processed: false,
        }
    }

    #[test]
    fn test_parse_window_units() {
        assert_eq!(parse_window("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_window("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_window("2h").unwrap(), Duration::from_secs(7_200));
        assert_eq!(parse_window("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_window(" 1h ").unwrap(), Duration::from_secs(3_600));
    }

    #[test]
    fn test_parse_window_rejects_garbage() {
        for bad in ["", "h", "12", "1w", "-5m", "0s", "3.5h"] {
            assert!(matches!(parse_window(bad), Err(Error::Analysis(_))), "{bad}");
        }
    }

    #[test]
    fn test_empty_window_report() {
        let config = EngineConfig::default();
        let report = build_report("1h", &[], &config);
        assert_eq!(report.summary.total_events, 0);
        assert_eq!(report.summary.error_rate, 0.0);
        assert_eq!(report.summary.performance_score, 1.0);
        assert!(report.insights.is_empty());
        assert!(report.anomalies.is_empty());
        assert!(report.trends.is_empty());
        assert!(report.predictions.is_empty());
        assert_eq!(report.recommendations, vec!["No action required.".to_string()]);
    }

    #[test]
    fn test_error_rate_insight_fires_above_five_percent() {
        let config = EngineConfig::default();
        let mut events: Vec<_> = (0..9).map(|_| event_with_duration(100)).collect();
        events.push(failure_event());
        let report = build_report("1h", &events, &config);
        assert!((report.summary.error_rate - 0.1).abs() < 1e-9);
        assert!(report
            .insights
            .iter()
            .any(|i| i.title == "elevated failure rate"));
    }

    #[test]
    fn test_anomaly_requires_twice_the_mean() {
        let config = EngineConfig::default();
        // Mean of [100, 100, 100, 700] is 250; only 700 exceeds 500.
        let events = vec![
            event_with_duration(100),
            event_with_duration(100),
            event_with_duration(100),
            event_with_duration(700),
        ];
        let report = build_report("1h", &events, &config);
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].duration_ms, 700);
        assert!((report.anomalies[0].mean_duration_ms - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_rising_trend_and_prediction() {
        let config = EngineConfig::default();
        let events = vec![
            event_with_duration(100),
            event_with_duration(100),
            event_with_duration(200),
            event_with_duration(200),
        ];
        let report = build_report("1h", &events, &config);
        assert_eq!(report.trends.len(), 1);
        assert_eq!(report.trends[0].direction, TrendDirection::Rising);
        assert!((report.trends[0].slope - 100.0).abs() < 1e-9);
        assert_eq!(report.predictions.len(), 1);
        assert!((report.predictions[0].current_mean - 150.0).abs() < 1e-9);
        assert!((report.predictions[0].predicted - 165.0).abs() < 1e-9);
    }

    #[test]
    fn test_patterns_mark_frequent_kinds() {
        let mut config = EngineConfig::default();
        config.pattern_min_count = 3;
        let events = vec![
            event_with_duration(10),
            event_with_duration(10),
            event_with_duration(10),
            failure_event(),
        ];
        let report = build_report("1h", &events, &config);
        let generation = report
            .patterns
            .iter()
            .find(|p| p.kind == EventKind::Generation)
            .unwrap();
        assert!(generation.frequent);
        assert_eq!(generation.count, 3);
        assert!((generation.confidence - 0.75).abs() < 1e-9);
        let failure = report
            .patterns
            .iter()
            .find(|p| p.kind == EventKind::RuntimeFailure)
            .unwrap();
        assert!(!failure.frequent);
    }
}
