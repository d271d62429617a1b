//! # ai-gateway-rust
//!
//! 这是本地模型运行时的智能网关：缓存、批处理、健康监控与遥测学习的统一入口。
//!
//! An intelligent gateway between application code and a local model-serving
//! runtime, adding the production layer the bare HTTP API lacks.
//!
//! ## Overview
//!
//! Application code talks to a local runtime (an Ollama-style HTTP server)
//! through one [`Gateway`] object instead of raw HTTP. On the way through, a
//! request is policy-reviewed, answered from cache when an identical request
//! was served recently, coalesced with its neighbors into model-partitioned
//! batches, and refused early when the runtime is confirmed down. Every step
//! emits a telemetry event, and the telemetry engine turns those events into
//! windowed analysis reports, anomaly flags and trained learning models.
//!
//! ## Core Philosophy
//!
//! - **One entry point**: the gateway owns policy, cache, batching, health
//!   and telemetry; application code never wires them together
//! - **Deterministic caching**: cache identity is a SHA-256 digest over
//!   model, prompt and sampling options, so equal requests always collide
//! - **Fail honestly**: timeouts and runtime failures are distinct errors,
//!   recorded but never retried behind the caller's back
//! - **Observe everything**: telemetry recording is synchronous and
//!   non-blocking; analysis and training run on background intervals
//!
//! ## Key Features
//!
//! - **Unified Gateway**: [`Gateway`] and [`GatewayBuilder`] compose every
//!   service with injectable seams for policy, metrics, scoring and storage
//! - **Response Cache**: TTL'd LRU cache with regex invalidation via the
//!   [`cache`] module
//! - **Request Batching**: debounced, priority-ordered, model-partitioned
//!   dispatch via the [`batch`] module
//! - **Health Supervision**: cached probes with failure-streak accounting in
//!   the [`runtime`] module
//! - **Telemetry and Learning**: event capture, windowed analysis, feedback
//!   accuracy and a four-track model registry in the [`telemetry`] module
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_gateway_rust::{GatewayBuilder, Priority, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> ai_gateway_rust::Result<()> {
//!     let gateway = GatewayBuilder::new().build()?;
//!
//!     let options = RequestOptions::new()
//!         .with_model("llama3")
//!         .with_priority(Priority::High)
//!         .with_temperature(0.2);
//!     let answer = gateway
//!         .generate_text("Why is the sky blue?", options, Some("user-42"))
//!         .await?;
//!     println!("{answer}");
//!
//!     let report = gateway.telemetry().analyze("15m").await?;
//!     println!("{} insights", report.insights.len());
//!
//!     gateway.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`gateway`] | Composition root: request orchestration and the builder |
//! | [`cache`] | Deterministic response cache with pluggable backends |
//! | [`batch`] | Debounced batching, priority ordering, model partitioning |
//! | [`runtime`] | HTTP client for the model runtime, health supervision |
//! | [`telemetry`] | Event log, windowed analysis, feedback and training |
//! | [`policy`] | Policy gate seam with allow-all and keyword gates |
//! | [`scoring`] | Confidence and prediction-accuracy heuristics |
//! | [`metrics`] | Host resource sampling via `sysinfo` |
//! | [`config`] | Typed configuration with YAML and environment loading |

pub mod batch;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod policy;
pub mod runtime;
pub mod scoring;
pub mod telemetry;

// Re-export main types for convenience
pub use batch::{BatchStats, Priority};
pub use cache::{CacheStats, TokenUsage};
pub use config::GatewayConfig;
pub use gateway::{Gateway, GatewayBuilder, GatewayStats, RequestOptions};
pub use runtime::{GenerateOptions, HealthReport, HealthStatus, ModelSummary};
pub use telemetry::{
    AnalysisReport, EngineStats, FeedbackInput, LearningModel, LearningTrack, TelemetryEngine,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A pinned, boxed stream of fallible items; what streaming calls return
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::Error;
