//! The gateway itself: policy, cache, batching and telemetry in one flow.

use super::types::{GatewayStats, RequestOptions};
use crate::batch::{
    BatchDispatcher, BatchOutcome, BatchRequest, BatchScheduler, Priority,
};
use crate::cache::{ResponseCache, TokenUsage};
use crate::config::GatewayConfig;
use crate::policy::{PolicyDecision, PolicyGate};
use crate::runtime::{
    GenerateOptions, GenerateRequest, HealthReport, ModelSummary, RuntimeClient,
};
use crate::telemetry::{EventDetail, EventDraft, TelemetryEngine};
use crate::{BoxStream, Error, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::warn;

/// Entry point for application code. Owns every service and the background
/// workers; construct one through [`crate::gateway::GatewayBuilder`] and keep
/// it for the life of the process.
pub struct Gateway {
    config: GatewayConfig,
    policy: Arc<dyn PolicyGate>,
    cache: Arc<ResponseCache>,
    client: Arc<RuntimeClient>,
    batcher: BatchScheduler<GatewayDispatcher>,
    telemetry: Arc<TelemetryEngine>,
    workers: Vec<JoinHandle<()>>,
}

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        config: GatewayConfig,
        policy: Arc<dyn PolicyGate>,
        cache: Arc<ResponseCache>,
        client: Arc<RuntimeClient>,
        batcher: BatchScheduler<GatewayDispatcher>,
        telemetry: Arc<TelemetryEngine>,
        workers: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            config,
            policy,
            cache,
            client,
            batcher,
            telemetry,
            workers,
        }
    }

    pub fn builder() -> super::GatewayBuilder {
        super::GatewayBuilder::new()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Generates a completion for `prompt`.
    ///
    /// The request runs through policy review, then the cache, then the
    /// runtime: a cached response returns immediately, a high-priority miss
    /// executes at once, and medium/low priorities wait for the debounced
    /// batch. The returned string is the full generation.
    pub async fn generate_text(
        &self,
        prompt: &str,
        options: RequestOptions,
        actor: Option<&str>,
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(Error::InvalidInput("prompt must not be empty".to_string()));
        }
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());
        let started = Instant::now();

        let decision = self.policy.review(prompt, actor).await?;
        if !decision.allowed {
            self.record_policy_rejection(&model, &decision, actor);
            return Err(Error::PolicyRejected {
                reason: decision.reason(),
            });
        }
        let prompt = decision.sanitized_prompt;
        let prompt_chars = prompt.chars().count();

        let sampling = options.sampling();
        let options_value = sampling_value(&sampling)?;

        if self.config.cache.enabled {
            let key = self.cache.key_for(&model, &prompt, options_value.as_ref());
            if let Some(hit) = self
                .cache
                .lookup(&model, &prompt, options_value.as_ref())
                .await?
            {
                self.record_cache_access(&model, key.as_str(), true, actor);
                return Ok(hit.content);
            }
            self.record_cache_access(&model, key.as_str(), false, actor);
        }

        self.client.ensure_healthy().await?;

        let (content, usage, from_cache, batched) = if options.priority == Priority::High {
            let request =
                GenerateRequest::new(model.clone(), prompt.clone()).with_options(sampling.clone());
            let response = match self.client.generate(&request).await {
                Ok(response) => response,
                Err(err) => {
                    self.record_failure("generate", &model, &err, actor, started);
                    return Err(err);
                }
            };
            let usage = response.usage();
            self.store_response(
                &model,
                &prompt,
                options_value.as_ref(),
                &response.response,
                usage,
                started.elapsed(),
                options.ttl_override(),
            )
            .await;
            (response.response, usage, false, false)
        } else {
            let mut request = BatchRequest::new(model.clone(), prompt.clone())
                .with_options(sampling.clone())
                .with_priority(options.priority);
            if let Some(ttl) = options.ttl_override() {
                request = request.with_cache_ttl(ttl);
            }
            match self.batcher.submit(request).await {
                Ok(response) => (
                    response.content,
                    response.usage,
                    response.served_from_cache,
                    true,
                ),
                Err(err) => {
                    self.record_failure("generate_batched", &model, &err, actor, started);
                    return Err(err);
                }
            }
        };

        // A dispatch-time cache hit was generated on behalf of an earlier
        // request; its dispatch event already accounts for it.
        if !from_cache {
            let mut draft = EventDraft::new(
                "gateway",
                EventDetail::Generation {
                    model: model.clone(),
                    prompt_chars,
                    content_chars: content.chars().count(),
                    usage,
                    batched,
                    stream_chunks: None,
                },
            )
            .with_duration(started.elapsed());
            if let Some(actor) = actor {
                draft = draft.with_actor(actor);
            }
            self.telemetry.record_event(draft);
        }
        Ok(content)
    }

    /// Streams a completion as decoded text fragments.
    ///
    /// Streams bypass the cache entirely. A generation event carrying the
    /// chunk count and final token usage is recorded when the stream ends;
    /// a stream abandoned mid-flight records nothing.
    pub async fn generate_text_stream(
        &self,
        prompt: &str,
        options: RequestOptions,
    ) -> Result<BoxStream<'static, String>> {
        if prompt.trim().is_empty() {
            return Err(Error::InvalidInput("prompt must not be empty".to_string()));
        }
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());

        let decision = self.policy.review(prompt, None).await?;
        if !decision.allowed {
            self.record_policy_rejection(&model, &decision, None);
            return Err(Error::PolicyRejected {
                reason: decision.reason(),
            });
        }
        let prompt = decision.sanitized_prompt;

        self.client.ensure_healthy().await?;

        let request = GenerateRequest::new(model.clone(), prompt.clone())
            .with_options(options.sampling())
            .streaming();
        let chunks = self.client.generate_stream(&request).await?;

        let accounting = StreamAccounting {
            telemetry: Arc::clone(&self.telemetry),
            model,
            prompt_chars: prompt.chars().count(),
            started: Instant::now(),
            chunks: 0,
            content_chars: 0,
            usage: TokenUsage::new(0, 0),
            failed: false,
        };
        let fragments = stream::unfold((chunks, accounting), |(mut inner, mut acc)| async move {
            match inner.next().await {
                Some(Ok(chunk)) => {
                    acc.chunks += 1;
                    acc.content_chars += chunk.response.chars().count();
                    if chunk.done {
                        acc.usage = chunk.usage();
                    }
                    Some((Ok(chunk.response), (inner, acc)))
                }
                Some(Err(err)) => {
                    acc.failed = true;
                    acc.telemetry.record_event(
                        EventDraft::new(
                            "gateway",
                            EventDetail::Failure {
                                operation: "generate_stream".to_string(),
                                model: acc.model.clone(),
                                error: err.to_string(),
                                timeout: err.is_timeout(),
                            },
                        )
                        .with_duration(acc.started.elapsed()),
                    );
                    Some((Err(err), (inner, acc)))
                }
                None => {
                    if !acc.failed {
                        acc.telemetry.record_event(
                            EventDraft::new(
                                "gateway",
                                EventDetail::Generation {
                                    model: acc.model.clone(),
                                    prompt_chars: acc.prompt_chars,
                                    content_chars: acc.content_chars,
                                    usage: acc.usage,
                                    batched: false,
                                    stream_chunks: Some(acc.chunks),
                                },
                            )
                            .with_duration(acc.started.elapsed()),
                        );
                    }
                    None
                }
            }
        });
        Ok(Box::pin(fragments))
    }

    /// Models installed on the runtime.
    pub async fn list_models(&self) -> Result<Vec<ModelSummary>> {
        Ok(self.client.list_models().await?.models)
    }

    /// Runtime health, served from the probe cache when fresh.
    pub async fn health(&self) -> Result<HealthReport> {
        Ok(self.client.health().await)
    }

    /// Removes cached responses whose model or prompt matches `pattern`.
    pub async fn invalidate_cache(&self, pattern: &str) -> Result<usize> {
        self.cache.invalidate(pattern).await
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.cache.clear().await
    }

    /// Snapshot across every service. Cheap; safe to poll.
    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            cache: self.cache.stats(),
            batch: self.batcher.stats(),
            telemetry: self.telemetry.stats(),
            health: self.client.last_health(),
        }
    }

    /// Analysis, feedback and training live on the engine.
    pub fn telemetry(&self) -> &Arc<TelemetryEngine> {
        &self.telemetry
    }

    /// Flushes queued work and stops the background workers. The gateway is
    /// still usable afterwards, but nothing runs on an interval anymore.
    pub async fn shutdown(&self) {
        self.batcher.flush().await;
        self.telemetry.process_pending().await;
        for worker in &self.workers {
            worker.abort();
        }
    }

    fn record_policy_rejection(
        &self,
        model: &str,
        decision: &PolicyDecision,
        actor: Option<&str>,
    ) {
        let mut draft = EventDraft::new(
            "gateway",
            EventDetail::PolicyRejected {
                model: model.to_string(),
                violations: decision.violations.clone(),
            },
        );
        if let Some(actor) = actor {
            draft = draft.with_actor(actor);
        }
        self.telemetry.record_event(draft);
    }

    fn record_cache_access(&self, model: &str, key: &str, hit: bool, actor: Option<&str>) {
        let mut draft = EventDraft::new(
            "gateway",
            EventDetail::CacheAccess {
                model: model.to_string(),
                key: key.to_string(),
                hit,
            },
        );
        if let Some(actor) = actor {
            draft = draft.with_actor(actor);
        }
        self.telemetry.record_event(draft);
    }

    fn record_failure(
        &self,
        operation: &str,
        model: &str,
        err: &Error,
        actor: Option<&str>,
        started: Instant,
    ) {
        let mut draft = EventDraft::new(
            "gateway",
            EventDetail::Failure {
                operation: operation.to_string(),
                model: model.to_string(),
                error: err.to_string(),
                timeout: err.is_timeout(),
            },
        )
        .with_duration(started.elapsed());
        if let Some(actor) = actor {
            draft = draft.with_actor(actor);
        }
        self.telemetry.record_event(draft);
    }

    #[allow(clippy::too_many_arguments)]
    async fn store_response(
        &self,
        model: &str,
        prompt: &str,
        options: Option<&serde_json::Value>,
        content: &str,
        usage: TokenUsage,
        elapsed: Duration,
        ttl: Option<Duration>,
    ) {
        if !self.config.cache.enabled {
            return;
        }
        let result = match ttl {
            Some(ttl) => {
                self.cache
                    .store_with_ttl(model, prompt, options, content, usage, elapsed, ttl)
                    .await
            }
            None => {
                self.cache
                    .store(model, prompt, options, content, usage, elapsed)
                    .await
            }
        };
        if let Err(err) = result {
            warn!(model, error = %err, "failed to cache response");
        }
    }
}

/// Rolling accounting for one outbound stream.
struct StreamAccounting {
    telemetry: Arc<TelemetryEngine>,
    model: String,
    prompt_chars: usize,
    started: Instant,
    chunks: usize,
    content_chars: usize,
    usage: TokenUsage,
    failed: bool,
}

/// Executes batched requests: re-checks the cache at dispatch time (an
/// identical request earlier in the batch may have filled it), then calls
/// the runtime and caches the result.
pub(super) struct GatewayDispatcher {
    cache: Arc<ResponseCache>,
    client: Arc<RuntimeClient>,
    cache_enabled: bool,
}

impl GatewayDispatcher {
    pub(super) fn new(
        cache: Arc<ResponseCache>,
        client: Arc<RuntimeClient>,
        cache_enabled: bool,
    ) -> Self {
        Self {
            cache,
            client,
            cache_enabled,
        }
    }
}

#[async_trait]
impl BatchDispatcher for GatewayDispatcher {
    async fn dispatch(&self, request: &BatchRequest) -> Result<BatchOutcome> {
        let options_value = sampling_value(&request.options)?;
        if self.cache_enabled {
            if let Some(hit) = self
                .cache
                .lookup(&request.model, &request.prompt, options_value.as_ref())
                .await?
            {
                return Ok(BatchOutcome {
                    content: hit.content,
                    usage: hit.usage,
                    served_from_cache: true,
                });
            }
        }

        let generate = GenerateRequest::new(request.model.clone(), request.prompt.clone())
            .with_options(request.options.clone());
        let started = Instant::now();
        let response = self.client.generate(&generate).await?;
        let usage = response.usage();

        if self.cache_enabled {
            let stored = match request.cache_ttl {
                Some(ttl) => {
                    self.cache
                        .store_with_ttl(
                            &request.model,
                            &request.prompt,
                            options_value.as_ref(),
                            response.response.as_str(),
                            usage,
                            started.elapsed(),
                            ttl,
                        )
                        .await
                }
                None => {
                    self.cache
                        .store(
                            &request.model,
                            &request.prompt,
                            options_value.as_ref(),
                            response.response.as_str(),
                            usage,
                            started.elapsed(),
                        )
                        .await
                }
            };
            if let Err(err) = stored {
                warn!(model = %request.model, error = %err, "failed to cache batched response");
            }
        }

        Ok(BatchOutcome {
            content: response.response,
            usage,
            served_from_cache: false,
        })
    }
}

/// The options object used for cache identity; `None` when every field is
/// unset so a bare request and an empty options object share a key.
fn sampling_value(options: &GenerateOptions) -> Result<Option<serde_json::Value>> {
    if options.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_value(options)?))
    }
}

/// Probes the runtime on an interval and records each verdict.
pub(super) fn spawn_probe_worker(
    client: Arc<RuntimeClient>,
    telemetry: Arc<TelemetryEngine>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = client.probe().await;
            telemetry.record_event(EventDraft::new(
                "runtime",
                EventDetail::HealthProbe {
                    status: report.status,
                    latency_ms: report.latency_ms,
                    consecutive_failures: report.consecutive_failures,
                },
            ));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::gateway::GatewayBuilder;
    use crate::policy::KeywordGate;
    use crate::telemetry::EventKind;

    fn test_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        // Unroutable per RFC 5737, so nothing probes a live service.
        config.runtime.base_url = "http://192.0.2.1:11434".to_string();
        config.environment = "test".to_string();
        config
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let gateway = GatewayBuilder::with_config(test_config()).build().unwrap();
        let err = gateway
            .generate_text("   ", RequestOptions::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_policy_rejection_records_event() {
        let gateway = GatewayBuilder::with_config(test_config())
            .policy_gate(KeywordGate::new().block_keyword("forbidden"))
            .build()
            .unwrap();

        let err = gateway
            .generate_text("something forbidden here", RequestOptions::new(), Some("user-9"))
            .await
            .unwrap_err();
        assert!(err.is_policy_rejection());

        let events = gateway.telemetry().events(5);
        let rejection = events
            .iter()
            .find(|e| e.kind == EventKind::PolicyRejected)
            .unwrap();
        assert_eq!(rejection.actors, vec!["user-9"]);
        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_cache_hit_returns_without_runtime() {
        let gateway = GatewayBuilder::with_config(test_config()).build().unwrap();
        gateway
            .cache
            .store(
                "llama3",
                "what is rust?",
                None,
                "a systems language",
                TokenUsage::new(4, 3),
                Duration::from_millis(120),
            )
            .await
            .unwrap();

        let content = gateway
            .generate_text("what is rust?", RequestOptions::new(), None)
            .await
            .unwrap();
        assert_eq!(content, "a systems language");

        let stats = gateway.stats();
        assert_eq!(stats.cache.hits, 1);
        let events = gateway.telemetry().events(5);
        assert!(events.iter().any(|e| e.kind == EventKind::CacheHit));
        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_stream_request_rejects_empty_prompt() {
        let gateway = GatewayBuilder::with_config(test_config()).build().unwrap();
        let err = gateway
            .generate_text_stream("", RequestOptions::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidInput(_)));
        gateway.shutdown().await;
    }

    #[test]
    fn test_sampling_value_empty_is_none() {
        assert!(sampling_value(&GenerateOptions::default())
            .unwrap()
            .is_none());
        let options = GenerateOptions {
            temperature: Some(0.7),
            ..Default::default()
        };
        let value = sampling_value(&options).unwrap().unwrap();
        assert_eq!(value["temperature"], 0.7);
    }
}
