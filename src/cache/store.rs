//! Response cache manager.

use super::backend::CacheBackend;
use super::key::{CacheKey, CacheKeyGenerator};
use crate::config::CacheConfig;
use crate::scoring::{ResponseSignals, ScoringStrategy};
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Token counts reported by the runtime for one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// The stored payload: the generation plus enough context to answer a lookup
/// without consulting the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub model: String,
    pub prompt: String,
    pub content: String,
    pub usage: TokenUsage,
    /// Diagnostic confidence in `[0, 1]` computed at store time.
    pub confidence: f64,
    pub processing_time_ms: u64,
    pub created_at_ms: u64,
}

impl CachedResponse {
    /// Age of the entry relative to the current wall clock.
    pub fn age(&self) -> Duration {
        Duration::from_millis(unix_millis().saturating_sub(self.created_at_ms))
    }
}

/// Counter snapshot exposed by [`ResponseCache::stats`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub invalidations: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    invalidations: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// High-level response cache.
///
/// Wraps a [`CacheBackend`] with key derivation, serialization, confidence
/// scoring and hit/miss accounting. TTL is enforced by the backend on read,
/// so an expired entry is indistinguishable from a miss.
pub struct ResponseCache {
    config: CacheConfig,
    backend: Box<dyn CacheBackend>,
    generator: CacheKeyGenerator,
    scoring: Arc<dyn ScoringStrategy>,
    stats: Arc<AtomicStats>,
}

impl ResponseCache {
    pub fn new(
        config: CacheConfig,
        backend: Box<dyn CacheBackend>,
        scoring: Arc<dyn ScoringStrategy>,
    ) -> Self {
        Self {
            config,
            backend,
            generator: CacheKeyGenerator::new(),
            scoring,
            stats: Arc::new(AtomicStats::new()),
        }
    }

    /// Derive the key a request would be stored under.
    pub fn key_for(
        &self,
        model: &str,
        prompt: &str,
        options: Option<&serde_json::Value>,
    ) -> CacheKey {
        self.generator.generate(model, prompt, options)
    }

    /// Look up a completed generation. `Ok(None)` covers miss, expiry and
    /// disabled caching alike.
    pub async fn lookup(
        &self,
        model: &str,
        prompt: &str,
        options: Option<&serde_json::Value>,
    ) -> Result<Option<CachedResponse>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let key = self.key_for(model, prompt, options);
        match self.backend.get(&key).await {
            Ok(Some(data)) => match serde_json::from_slice::<CachedResponse>(&data) {
                Ok(response) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, model, "cache hit");
                    Ok(Some(response))
                }
                Err(_) => {
                    // Corrupt entry: drop it and report a miss.
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    let _ = self.backend.delete(&key).await;
                    Ok(None)
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Store a completed generation under its derived key with the default TTL.
    pub async fn store(
        &self,
        model: &str,
        prompt: &str,
        options: Option<&serde_json::Value>,
        content: impl Into<String>,
        usage: TokenUsage,
        processing_time: Duration,
    ) -> Result<CacheKey> {
        self.store_with_ttl(
            model,
            prompt,
            options,
            content,
            usage,
            processing_time,
            self.config.default_ttl(),
        )
        .await
    }

    /// Store with an explicit TTL override.
    #[allow(clippy::too_many_arguments)]
    pub async fn store_with_ttl(
        &self,
        model: &str,
        prompt: &str,
        options: Option<&serde_json::Value>,
        content: impl Into<String>,
        usage: TokenUsage,
        processing_time: Duration,
        ttl: Duration,
    ) -> Result<CacheKey> {
        let key = self.key_for(model, prompt, options);
        if !self.config.enabled {
            return Ok(key);
        }
        let content = content.into();
        let signals = ResponseSignals {
            content_len: content.len(),
            token_usage: usage,
            processing_time,
        };
        let response = CachedResponse {
            model: model.to_string(),
            prompt: prompt.to_string(),
            content,
            usage,
            confidence: self.scoring.response_confidence(&signals),
            processing_time_ms: processing_time.as_millis() as u64,
            created_at_ms: unix_millis(),
        };
        let data = serde_json::to_vec(&response)?;
        match self.backend.set(&key, &data, ttl).await {
            Ok(()) => {
                self.stats.stores.fetch_add(1, Ordering::Relaxed);
                Ok(key)
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Remove every live entry whose model or prompt matches `pattern`
    /// (a regex). Returns how many entries were removed.
    pub async fn invalidate(&self, pattern: &str) -> Result<usize> {
        let re = Regex::new(pattern).map_err(|e| {
            Error::InvalidInput(format!("invalid invalidation pattern '{}': {}", pattern, e))
        })?;
        let mut removed = 0;
        for key in self.backend.keys().await? {
            let matches = key.model.as_deref().is_some_and(|m| re.is_match(m))
                || key.prompt.as_deref().is_some_and(|p| re.is_match(p));
            if matches && self.backend.delete(&key).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            self.stats
                .invalidations
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(pattern, removed, "invalidated cache entries");
        }
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }

    /// Number of live entries.
    pub async fn len(&self) -> Result<usize> {
        self.backend.len().await
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use crate::scoring::HeuristicScoring;

    fn cache_with(config: CacheConfig) -> ResponseCache {
        let capacity = config.capacity;
        ResponseCache::new(
            config,
            Box::new(MemoryBackend::new(capacity)),
            Arc::new(HeuristicScoring::new()),
        )
    }

    #[tokio::test]
    async fn test_store_then_lookup_round_trip() {
        let cache = cache_with(CacheConfig::default());
        cache
            .store(
                "llama3",
                "what is rust",
                None,
                "A systems programming language.",
                TokenUsage::new(4, 6),
                Duration::from_millis(120),
            )
            .await
            .unwrap();

        let hit = cache.lookup("llama3", "what is rust", None).await.unwrap();
        let hit = hit.expect("entry should be present");
        assert_eq!(hit.content, "A systems programming language.");
        assert_eq!(hit.usage.total(), 10);
        assert!(hit.confidence > 0.0 && hit.confidence <= 1.0);

        let stats = cache.stats();
        assert_eq!(stats.stores, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_different_options_miss() {
        let cache = cache_with(CacheConfig::default());
        let opts = serde_json::json!({"temperature": 0.1});
        cache
            .store(
                "llama3",
                "p",
                Some(&opts),
                "r",
                TokenUsage::default(),
                Duration::from_millis(5),
            )
            .await
            .unwrap();
        assert!(cache.lookup("llama3", "p", None).await.unwrap().is_none());
        assert!(cache.lookup("llama3", "p", Some(&opts)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ttl_expiry_reads_as_miss() {
        let cache = cache_with(CacheConfig::default());
        cache
            .store_with_ttl(
                "llama3",
                "ephemeral",
                None,
                "r",
                TokenUsage::default(),
                Duration::from_millis(5),
                Duration::from_millis(20),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.lookup("llama3", "ephemeral", None).await.unwrap().is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_stores_nothing() {
        let cache = cache_with(CacheConfig::default().with_enabled(false));
        cache
            .store(
                "llama3",
                "p",
                None,
                "r",
                TokenUsage::default(),
                Duration::from_millis(5),
            )
            .await
            .unwrap();
        assert!(cache.lookup("llama3", "p", None).await.unwrap().is_none());
        assert_eq!(cache.stats().stores, 0);
    }

    #[tokio::test]
    async fn test_invalidate_by_model_pattern() {
        let cache = cache_with(CacheConfig::default());
        let usage = TokenUsage::default();
        let dt = Duration::from_millis(5);
        cache.store("llama3", "a", None, "r1", usage, dt).await.unwrap();
        cache.store("llama3:70b", "b", None, "r2", usage, dt).await.unwrap();
        cache.store("mistral", "c", None, "r3", usage, dt).await.unwrap();

        let removed = cache.invalidate("^llama3").await.unwrap();
        assert_eq!(removed, 2);
        assert!(cache.lookup("mistral", "c", None).await.unwrap().is_some());
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[tokio::test]
    async fn test_invalidate_by_prompt_pattern() {
        let cache = cache_with(CacheConfig::default());
        let usage = TokenUsage::default();
        let dt = Duration::from_millis(5);
        cache.store("llama3", "weather in Oslo", None, "r", usage, dt).await.unwrap();
        cache.store("llama3", "weather in Lima", None, "r", usage, dt).await.unwrap();
        cache.store("llama3", "capital of Peru", None, "r", usage, dt).await.unwrap();

        assert_eq!(cache.invalidate("weather").await.unwrap(), 2);
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_rejects_bad_regex() {
        let cache = cache_with(CacheConfig::default());
        let err = cache.invalidate("(unclosed").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
