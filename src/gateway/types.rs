//! Caller-facing request options and observability snapshots.

use crate::batch::{BatchStats, Priority};
use crate::cache::CacheStats;
use crate::runtime::{GenerateOptions, HealthReport};
use crate::telemetry::EngineStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Per-request knobs for [`crate::gateway::Gateway::generate_text`].
///
/// Everything is optional; the model falls back to the configured default.
/// The sampling fields are part of the cache identity, so two requests that
/// differ only in `temperature` never share a cached response. Priority and
/// TTL are routing and retention concerns and never touch the key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    pub model: Option<String>,
    pub priority: Priority,
    /// Per-response cache TTL override, in milliseconds.
    pub ttl_override_ms: Option<u64>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub num_predict: Option<u32>,
    pub seed: Option<u64>,
    pub stop: Option<Vec<String>>,
    /// Extra runtime options forwarded as-is.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override_ms = Some(ttl.as_millis() as u64);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub(crate) fn ttl_override(&self) -> Option<Duration> {
        self.ttl_override_ms.map(Duration::from_millis)
    }

    /// Sampling fields folded into the runtime options object.
    pub(crate) fn sampling(&self) -> GenerateOptions {
        GenerateOptions {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            num_predict: self.num_predict,
            seed: self.seed,
            stop: self.stop.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// One-call observability snapshot across all gateway services.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub cache: CacheStats,
    pub batch: BatchStats,
    pub telemetry: EngineStats,
    /// Last probe-derived runtime report, if any probe has run yet.
    pub health: Option<HealthReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_excludes_routing_fields() {
        let options = RequestOptions::new()
            .with_model("mistral")
            .with_priority(Priority::High)
            .with_ttl(Duration::from_secs(60))
            .with_temperature(0.2)
            .with_seed(7);
        let sampling = options.sampling();
        assert_eq!(sampling.temperature, Some(0.2));
        assert_eq!(sampling.seed, Some(7));

        let value = serde_json::to_value(&sampling).unwrap();
        assert!(value.get("model").is_none());
        assert!(value.get("priority").is_none());
        assert!(value.get("ttl_override_ms").is_none());
    }

    #[test]
    fn test_extra_options_flatten_into_sampling() {
        let options = RequestOptions::new().with_extra("mirostat", serde_json::json!(2));
        let value = serde_json::to_value(&options.sampling()).unwrap();
        assert_eq!(value["mirostat"], 2);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: RequestOptions = serde_json::from_str(r#"{"priority":"high"}"#).unwrap();
        assert_eq!(options.priority, Priority::High);
        assert!(options.model.is_none());
        assert!(options.sampling().is_empty());
    }
}
