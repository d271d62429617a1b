//! 推理运行时连接器：HTTP 客户端、流式解码与健康监督。
//!
//! # Runtime Connector Module
//!
//! Talks to the local model-serving runtime over its JSON HTTP API. All
//! outbound calls are deadline-bound, streaming responses are decoded from
//! NDJSON into typed chunks, and a health monitor keeps a probe-derived
//! verdict that gates request execution.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RuntimeClient`] | Deadline-bound HTTP client with health supervision |
//! | [`GenerateRequest`] / [`GenerateResponse`] | Completion wire types |
//! | [`ModelList`] / [`ModelSummary`] | Installed-model listing |
//! | [`HealthReport`] / [`HealthStatus`] | Probe-derived runtime health |
//!
//! ## Failure Classes
//!
//! A deadline expiry is [`crate::Error::Timeout`]; a non-2xx answer or a
//! malformed body is [`crate::Error::Runtime`]. The two are never conflated,
//! so retry policies can treat them differently.

mod api;
mod client;
mod stream;

pub use api::{
    GenerateOptions, GenerateRequest, GenerateResponse, HealthReport, HealthStatus, ModelList,
    ModelSummary, VersionInfo,
};
pub use client::RuntimeClient;
