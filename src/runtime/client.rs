//! HTTP client for the inference runtime, with health supervision.

use super::api::{
    GenerateRequest, GenerateResponse, HealthReport, HealthStatus, ModelList, VersionInfo,
};
use super::stream::decode_chunks;
use crate::config::RuntimeConfig;
use crate::{BoxStream, Error, Result};
use arc_swap::ArcSwapOption;
use futures::TryStreamExt;
use serde::Deserialize;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Tracks probe outcomes and decides the runtime's health status.
///
/// One success flips the status back to healthy immediately; it takes
/// `failure_threshold` consecutive failures to flip it to unhealthy, so a
/// single dropped probe does not take the runtime out of rotation.
struct HealthMonitor {
    failure_threshold: u32,
    consecutive_failures: AtomicU32,
    last: ArcSwapOption<ProbeRecord>,
}

struct ProbeRecord {
    report: HealthReport,
    at: Instant,
}

impl HealthMonitor {
    fn new(failure_threshold: u32) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            consecutive_failures: AtomicU32::new(0),
            last: ArcSwapOption::const_empty(),
        }
    }

    fn record_success(&self, latency: Duration, version: Option<String>) -> HealthReport {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let report = HealthReport {
            status: HealthStatus::Healthy,
            consecutive_failures: 0,
            latency_ms: Some(latency.as_millis() as u64),
            version,
            message: None,
        };
        self.remember(report.clone());
        report
    }

    fn record_failure(&self, message: String) -> HealthReport {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let status = if failures >= self.failure_threshold {
            HealthStatus::Unhealthy
        } else {
            // Below the threshold the previous verdict stands.
            self.last
                .load()
                .as_ref()
                .map(|r| r.report.status)
                .unwrap_or(HealthStatus::Unknown)
        };
        let report = HealthReport {
            status,
            consecutive_failures: failures,
            latency_ms: None,
            version: None,
            message: Some(message),
        };
        self.remember(report.clone());
        report
    }

    fn remember(&self, report: HealthReport) {
        self.last.store(Some(Arc::new(ProbeRecord {
            report,
            at: Instant::now(),
        })));
    }

    fn fresh(&self, max_age: Duration) -> Option<HealthReport> {
        let guard = self.last.load();
        guard.as_ref().and_then(|r| {
            if r.at.elapsed() <= max_age {
                Some(r.report.clone())
            } else {
                None
            }
        })
    }

    fn last_report(&self) -> Option<HealthReport> {
        self.last.load().as_ref().map(|r| r.report.clone())
    }
}

/// Client for the inference runtime.
///
/// Every call runs under the configured deadline; expiry surfaces as
/// [`Error::Timeout`], which is a different failure class from a runtime
/// fault ([`Error::Runtime`]) so callers can retry one and not the other.
pub struct RuntimeClient {
    config: RuntimeConfig,
    client: reqwest::Client,
    monitor: HealthMonitor,
}

impl RuntimeClient {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            Error::Configuration(format!(
                "invalid runtime base URL '{}': {}",
                config.base_url, e
            ))
        })?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;
        let monitor = HealthMonitor::new(config.failure_threshold);
        Ok(Self {
            config,
            client,
            monitor,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Run `fut` under the request deadline, mapping expiry to a timeout
    /// error labelled with the operation.
    async fn with_deadline<F, T>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        match tokio::time::timeout(self.config.request_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(operation, started.elapsed())),
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or_else(|_| {
                if body.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                } else {
                    body
                }
            });
        Err(Error::runtime_status(status.as_u16(), message))
    }

    /// Unary completion. Forces `stream: false` regardless of the request.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let mut request = request.clone();
        request.stream = false;
        let url = self.endpoint("/api/generate");
        self.with_deadline("generate", async {
            let response = self.client.post(&url).json(&request).send().await?;
            let response = Self::check_status(response).await?;
            let bytes = response.bytes().await?;
            serde_json::from_slice(&bytes)
                .map_err(|e| Error::runtime(format!("malformed generate response: {}", e)))
        })
        .await
    }

    /// Streaming completion. The deadline covers establishing the stream;
    /// once chunks are flowing the stream itself is not deadline-bound.
    pub async fn generate_stream(
        &self,
        request: &GenerateRequest,
    ) -> Result<BoxStream<'static, GenerateResponse>> {
        let mut request = request.clone();
        request.stream = true;
        let url = self.endpoint("/api/generate");
        let response = self
            .with_deadline("generate_stream", async {
                let response = self.client.post(&url).json(&request).send().await?;
                Self::check_status(response).await
            })
            .await?;
        let bytes = response.bytes_stream().map_err(Error::from);
        Ok(decode_chunks(Box::pin(bytes)))
    }

    /// Models installed on the runtime.
    pub async fn list_models(&self) -> Result<ModelList> {
        let url = self.endpoint("/api/tags");
        self.with_deadline("list_models", async {
            let response = self.client.get(&url).send().await?;
            let response = Self::check_status(response).await?;
            let bytes = response.bytes().await?;
            serde_json::from_slice(&bytes)
                .map_err(|e| Error::runtime(format!("malformed model list: {}", e)))
        })
        .await
    }

    /// Probe the runtime once and fold the outcome into the health monitor.
    pub async fn probe(&self) -> HealthReport {
        let url = self.endpoint("/api/version");
        let started = Instant::now();
        let outcome = self
            .with_deadline("probe", async {
                let response = self.client.get(&url).send().await?;
                let response = Self::check_status(response).await?;
                let bytes = response.bytes().await?;
                serde_json::from_slice::<VersionInfo>(&bytes)
                    .map_err(|e| Error::runtime(format!("malformed version response: {}", e)))
            })
            .await;
        match outcome {
            Ok(info) => {
                let report = self.monitor.record_success(started.elapsed(), Some(info.version));
                debug!(latency_ms = ?report.latency_ms, "runtime probe ok");
                report
            }
            Err(e) => {
                let report = self.monitor.record_failure(e.to_string());
                warn!(
                    error = %e,
                    consecutive_failures = report.consecutive_failures,
                    status = %report.status,
                    "runtime probe failed"
                );
                report
            }
        }
    }

    /// Current health, served from the last probe if it is still fresh.
    pub async fn health(&self) -> HealthReport {
        if let Some(report) = self.monitor.fresh(self.config.probe_cache()) {
            return report;
        }
        self.probe().await
    }

    /// Gate a call on the runtime being reachable. Only a confirmed
    /// unhealthy verdict blocks; unknown passes through so a cold start can
    /// still make progress.
    pub async fn ensure_healthy(&self) -> Result<()> {
        let report = self.health().await;
        if report.status == HealthStatus::Unhealthy {
            return Err(Error::runtime(format!(
                "inference runtime at {} is unhealthy ({} consecutive probe failures)",
                self.config.base_url, report.consecutive_failures
            )));
        }
        Ok(())
    }

    /// Last probe outcome, if any probe has run.
    pub fn last_health(&self) -> Option<HealthReport> {
        self.monitor.last_report()
    }
}
