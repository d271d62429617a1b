//! 响应缓存模块：在网关入口短路重复的生成请求。
//!
//! # Response Caching Module
//!
//! Caches completed generations so repeated prompts are answered without
//! touching the inference runtime. Keys are deterministic digests over the
//! request identity, entries expire after a TTL and capacity is bounded by
//! LRU eviction, so the cache never grows without limit.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | High-level cache with TTL, statistics and invalidation |
//! | [`CacheBackend`] | Trait for pluggable storage backends |
//! | [`MemoryBackend`] | In-memory LRU backend |
//! | [`NullBackend`] | No-op backend for disabling caching |
//! | [`CacheKey`] / [`CacheKeyGenerator`] | Deterministic key derivation |
//! | [`CachedResponse`] | The stored payload, including a confidence score |
//!
//! ## Key Generation
//!
//! A key is the SHA-256 digest of the canonicalized `(model, prompt, sampling
//! options)` triple. Identical requests always map to the same key; any
//! difference in model, prompt text or options yields a different one.

mod backend;
mod key;
mod store;

pub use backend::{CacheBackend, MemoryBackend, NullBackend};
pub use key::{CacheKey, CacheKeyGenerator};
pub use store::{CacheStats, CachedResponse, ResponseCache, TokenUsage};
