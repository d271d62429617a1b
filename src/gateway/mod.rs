//! 网关模块：策略、缓存、批处理、运行时与遥测的组合根。
//!
//! # Gateway Module
//!
//! The composition root. A [`Gateway`] owns one of each service and threads a
//! generation request through them in a fixed order: policy review, cache
//! lookup, health gate, then either an immediate runtime call (high priority)
//! or the debounced batch path. Every step records what happened, so the
//! telemetry engine sees the full life of each request without any service
//! knowing about the others.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Gateway`] | Request orchestration plus background worker ownership |
//! | [`GatewayBuilder`] | Wiring with injectable policy, metrics, scoring, store and cache backend |
//! | [`RequestOptions`] | Per-call routing (model, priority, TTL) and sampling knobs |
//! | [`GatewayStats`] | One snapshot across cache, batch, telemetry and health |
//!
//! ## Usage
//!
//! ```no_run
//! use ai_gateway_rust::{GatewayBuilder, RequestOptions};
//!
//! # async fn demo() -> ai_gateway_rust::Result<()> {
//! let gateway = GatewayBuilder::new().build()?;
//! let answer = gateway
//!     .generate_text("Why is the sky blue?", RequestOptions::new(), None)
//!     .await?;
//! println!("{answer}");
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod builder;
mod service;
mod types;

pub use builder::GatewayBuilder;
pub use service::Gateway;
pub use types::{GatewayStats, RequestOptions};
