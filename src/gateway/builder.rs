//! Wires the services together and starts the background workers.

use super::service::{spawn_probe_worker, Gateway, GatewayDispatcher};
use crate::batch::BatchScheduler;
use crate::cache::{CacheBackend, MemoryBackend, ResponseCache};
use crate::config::GatewayConfig;
use crate::metrics::{MetricsSource, SystemMetricsSource};
use crate::policy::{AllowAllGate, PolicyGate};
use crate::runtime::RuntimeClient;
use crate::scoring::{HeuristicScoring, ScoringStrategy};
use crate::telemetry::{MemoryStore, TelemetryEngine, TelemetryStore};
use crate::Result;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Assembles a [`Gateway`]. Every seam has a default: an allow-all policy,
/// host metrics via `sysinfo`, the heuristic scorer, an in-memory telemetry
/// store and the LRU cache backend. Swap any of them before `build`.
///
/// `build` spawns the telemetry drain and health probe workers (plus the
/// training worker when a training interval is configured), so it must run
/// inside a Tokio runtime.
pub struct GatewayBuilder {
    config: GatewayConfig,
    policy: Option<Arc<dyn PolicyGate>>,
    metrics: Option<Arc<dyn MetricsSource>>,
    scoring: Option<Arc<dyn ScoringStrategy>>,
    store: Option<Arc<dyn TelemetryStore>>,
    cache_backend: Option<Box<dyn CacheBackend>>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self::with_config(GatewayConfig::default())
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        Self {
            config,
            policy: None,
            metrics: None,
            scoring: None,
            store: None,
            cache_backend: None,
        }
    }

    pub fn policy_gate(mut self, gate: impl PolicyGate + 'static) -> Self {
        self.policy = Some(Arc::new(gate));
        self
    }

    pub fn metrics_source(mut self, source: impl MetricsSource + 'static) -> Self {
        self.metrics = Some(Arc::new(source));
        self
    }

    pub fn scoring(mut self, strategy: impl ScoringStrategy + 'static) -> Self {
        self.scoring = Some(Arc::new(strategy));
        self
    }

    pub fn telemetry_store(mut self, store: impl TelemetryStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn cache_backend(mut self, backend: impl CacheBackend + 'static) -> Self {
        self.cache_backend = Some(Box::new(backend));
        self
    }

    pub fn build(self) -> Result<Gateway> {
        self.config.validate()?;
        let mut config = self.config;
        if config.instance_id.is_empty() {
            config.instance_id = Uuid::new_v4().to_string();
        }

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(SystemMetricsSource::new()));
        let scoring = self
            .scoring
            .unwrap_or_else(|| Arc::new(HeuristicScoring::new()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::default()));
        let policy = self.policy.unwrap_or_else(|| Arc::new(AllowAllGate::new()));
        let backend = self
            .cache_backend
            .unwrap_or_else(|| Box::new(MemoryBackend::new(config.cache.capacity)));

        let telemetry = Arc::new(
            TelemetryEngine::new(
                config.telemetry.clone(),
                Arc::clone(&metrics),
                Arc::clone(&scoring),
                store,
            )
            .with_context(config.environment.clone(), config.instance_id.clone()),
        );
        let cache = Arc::new(ResponseCache::new(
            config.cache.clone(),
            backend,
            Arc::clone(&scoring),
        ));
        let client = Arc::new(RuntimeClient::new(config.runtime.clone())?);

        let dispatcher = GatewayDispatcher::new(
            Arc::clone(&cache),
            Arc::clone(&client),
            config.cache.enabled,
        );
        let batcher = BatchScheduler::new(config.batch.clone(), dispatcher, Arc::clone(&telemetry));

        let mut workers = vec![
            Arc::clone(&telemetry).spawn_worker(),
            spawn_probe_worker(
                Arc::clone(&client),
                Arc::clone(&telemetry),
                config.runtime.probe_interval(),
            ),
        ];
        if let Some(worker) = Arc::clone(&telemetry).spawn_training_worker() {
            workers.push(worker);
        }

        info!(
            instance = %config.instance_id,
            model = %config.default_model,
            policy = policy.name(),
            "gateway assembled"
        );
        Ok(Gateway::new(
            config, policy, cache, client, batcher, telemetry, workers,
        ))
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
