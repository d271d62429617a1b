//! 批处理调度模块：去抖动合并、按模型分组、按优先级派发。
//!
//! # Request Batching Module
//!
//! Coalesces bursts of generation requests instead of firing each one at the
//! runtime on arrival. The first submission arms a debounce timer; everything
//! queued before it fires is dispatched in one pass, grouped by model and
//! ordered by priority. Models dispatch concurrently with each other, while
//! requests for the same model run strictly in order.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchScheduler`] | Debounced queue with partition, sort and chunk logic |
//! | [`BatchRequest`] / [`BatchResponse`] | Queue entry and its reply |
//! | [`Priority`] | Three-level dispatch priority, stable within a level |
//! | [`BatchDispatcher`] | Seam the gateway implements to execute one request |
//!
//! ## Ordering Guarantees
//!
//! Within one model's batch: high before medium before low, and submission
//! order inside each level. Chunks are bounded, so one saturated model cannot
//! hold an unbounded dispatch loop.

mod scheduler;
mod types;

pub use scheduler::{BatchScheduler, BatchStats};
pub use types::{BatchDispatcher, BatchOutcome, BatchRequest, BatchResponse, Priority};
