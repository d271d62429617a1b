//! Gateway configuration.
//!
//! Each subsystem has its own config struct with documented defaults; the whole
//! tree loads from YAML and accepts `AI_GATEWAY_*` environment overrides so a
//! deployment can be tuned without recompiling. Durations are carried as
//! millisecond integers (YAML/env friendly) with `Duration` accessors.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Connector settings for the inference runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Base URL of the runtime, e.g. `http://127.0.0.1:11434`.
    pub base_url: String,
    /// Deadline for every outbound call.
    pub request_timeout_ms: u64,
    /// How long a probe result stays fresh before `ensure_healthy` re-probes.
    pub probe_cache_ms: u64,
    /// Interval of the background probe loop.
    pub probe_interval_ms: u64,
    /// Consecutive probe failures before the connector flips to unhealthy.
    pub failure_threshold: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            request_timeout_ms: 30_000,
            probe_cache_ms: 30_000,
            probe_interval_ms: 30_000,
            failure_threshold: 3,
        }
    }
}

impl RuntimeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
    pub fn probe_cache(&self) -> Duration {
        Duration::from_millis(self.probe_cache_ms)
    }
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Maximum number of entries; insertion beyond this evicts the least
    /// recently used entry.
    pub capacity: usize,
    /// Default TTL applied when `store` receives no override.
    pub default_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1000,
            default_ttl_ms: 5 * 60 * 1000,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_ms = ttl.as_millis() as u64;
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Batch scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Debounce delay between the first enqueue and the drain.
    pub debounce_ms: u64,
    /// Upper bound on requests dispatched in one chunk.
    pub max_chunk_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            max_chunk_size: 10,
        }
    }
}

impl BatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }
    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size.max(1);
        self
    }
}

/// Telemetry engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval of the background drain worker.
    pub drain_interval_ms: u64,
    /// Maximum events processed per drain.
    pub drain_batch_size: usize,
    /// Operations slower than this are flagged by per-event analysis.
    pub slow_threshold_ms: u64,
    /// Memory utilization above this fraction is flagged.
    pub resource_threshold: f64,
    /// Minimum occurrences of one event kind before it counts as a pattern.
    pub pattern_min_count: usize,
    /// Upper bound on retained events; the oldest are discarded past this.
    pub history_limit: usize,
    /// Optional interval for the model training worker. `None` disables it.
    pub training_interval_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: 5_000,
            drain_batch_size: 100,
            slow_threshold_ms: 5_000,
            resource_threshold: 0.85,
            pattern_min_count: 10,
            history_limit: 10_000,
            training_interval_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
    pub fn training_interval(&self) -> Option<Duration> {
        self.training_interval_ms.map(Duration::from_millis)
    }
    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval_ms = interval.as_millis() as u64;
        self
    }
    pub fn with_drain_batch_size(mut self, size: usize) -> Self {
        self.drain_batch_size = size.max(1);
        self
    }
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold_ms = threshold.as_millis() as u64;
        self
    }
    pub fn with_training_interval(mut self, interval: Duration) -> Self {
        self.training_interval_ms = Some(interval.as_millis() as u64);
        self
    }
}

/// Aggregate gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub runtime: RuntimeConfig,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub telemetry: EngineConfig,
    /// Model used when a request does not name one.
    pub default_model: String,
    /// Deployment environment tag stamped onto telemetry events.
    pub environment: String,
    /// Instance identifier stamped onto telemetry events. Empty means
    /// "generate one at build time".
    pub instance_id: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
            telemetry: EngineConfig::default(),
            default_model: "llama3".to_string(),
            environment: "development".to_string(),
            instance_id: String::new(),
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Load from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::Configuration(format!("invalid YAML config: {}", e)))
    }

    /// Load from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    /// Apply `AI_GATEWAY_*` environment overrides on top of the current values.
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = env::var("AI_GATEWAY_RUNTIME_URL") {
            if !url.trim().is_empty() {
                self.runtime.base_url = url;
            }
        }
        if let Some(ms) = env_u64("AI_GATEWAY_TIMEOUT_MS") {
            self.runtime.request_timeout_ms = ms;
        }
        if let Some(ms) = env_u64("AI_GATEWAY_PROBE_INTERVAL_MS") {
            self.runtime.probe_interval_ms = ms;
        }
        if let Ok(model) = env::var("AI_GATEWAY_DEFAULT_MODEL") {
            if !model.trim().is_empty() {
                self.default_model = model;
            }
        }
        if let Some(ms) = env_u64("AI_GATEWAY_CACHE_TTL_MS") {
            self.cache.default_ttl_ms = ms;
        }
        if let Some(n) = env_u64("AI_GATEWAY_CACHE_CAPACITY") {
            self.cache.capacity = (n as usize).max(1);
        }
        if let Some(ms) = env_u64("AI_GATEWAY_BATCH_DEBOUNCE_MS") {
            self.batch.debounce_ms = ms;
        }
        if let Some(n) = env_u64("AI_GATEWAY_BATCH_CHUNK_SIZE") {
            self.batch.max_chunk_size = (n as usize).max(1);
        }
        if let Some(ms) = env_u64("AI_GATEWAY_DRAIN_INTERVAL_MS") {
            self.telemetry.drain_interval_ms = ms;
        }
        self
    }

    /// Validate invariants that would otherwise surface as confusing runtime
    /// failures.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.runtime.base_url).map_err(|e| {
            Error::Configuration(format!(
                "runtime.base_url '{}' is not a valid URL: {}",
                self.runtime.base_url, e
            ))
        })?;
        if self.cache.capacity == 0 {
            return Err(Error::Configuration("cache.capacity must be > 0".into()));
        }
        if self.batch.max_chunk_size == 0 {
            return Err(Error::Configuration(
                "batch.max_chunk_size must be > 0".into(),
            ));
        }
        if self.telemetry.drain_batch_size == 0 {
            return Err(Error::Configuration(
                "telemetry.drain_batch_size must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.telemetry.resource_threshold) {
            return Err(Error::Configuration(
                "telemetry.resource_threshold must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|s| s.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = GatewayConfig::default();
        assert_eq!(config.cache.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.batch.debounce(), Duration::from_millis(100));
        assert_eq!(config.batch.max_chunk_size, 10);
        assert_eq!(config.runtime.probe_cache(), Duration::from_secs(30));
        assert_eq!(config.runtime.failure_threshold, 3);
        assert_eq!(config.telemetry.drain_interval(), Duration::from_secs(5));
        assert_eq!(config.telemetry.drain_batch_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip_with_partial_document() {
        let yaml = r#"
default_model: mistral
runtime:
  base_url: http://10.0.0.5:11434
  request_timeout_ms: 5000
cache:
  capacity: 32
"#;
        let config = GatewayConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.default_model, "mistral");
        assert_eq!(config.runtime.base_url, "http://10.0.0.5:11434");
        assert_eq!(config.runtime.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.cache.capacity, 32);
        // Unspecified sections keep their defaults.
        assert_eq!(config.batch.max_chunk_size, 10);
    }

    #[test]
    fn test_invalid_yaml_is_configuration_error() {
        let err = GatewayConfig::from_yaml_str("runtime: [not, a, map]").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config = GatewayConfig::default();
        config.runtime.base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_builder_methods_clamp() {
        let batch = BatchConfig::default().with_max_chunk_size(0);
        assert_eq!(batch.max_chunk_size, 1);
        let cache = CacheConfig::default().with_capacity(0);
        assert_eq!(cache.capacity, 1);
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("AI_GATEWAY_CACHE_TTL_MS", "1234");
        env::set_var("AI_GATEWAY_BATCH_CHUNK_SIZE", "4");
        let config = GatewayConfig::default().apply_env();
        env::remove_var("AI_GATEWAY_CACHE_TTL_MS");
        env::remove_var("AI_GATEWAY_BATCH_CHUNK_SIZE");
        assert_eq!(config.cache.default_ttl_ms, 1234);
        assert_eq!(config.batch.max_chunk_size, 4);
    }
}
