//! Cache backend implementations.

use super::key::CacheKey;
use crate::Result;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Clone)]
struct StoredEntry {
    key: CacheKey,
    data: Vec<u8>,
    created_at: Instant,
    ttl: Duration,
}

impl StoredEntry {
    fn new(key: CacheKey, data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            key,
            data,
            created_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// Storage seam for the response cache. Implementations store opaque bytes;
/// serialization stays in [`super::ResponseCache`].
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &CacheKey) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    /// Number of live (non-expired) entries.
    async fn len(&self) -> Result<usize>;
    /// Keys of live entries, for pattern invalidation.
    async fn keys(&self) -> Result<Vec<CacheKey>>;
    fn name(&self) -> &'static str;
}

/// In-memory backend: a mutex-guarded LRU map. Insertion beyond capacity
/// evicts the least recently used entry; expired entries are dropped on read.
pub struct MemoryBackend {
    entries: Mutex<LruCache<String, StoredEntry>>,
}

impl MemoryBackend {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, StoredEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let mut entries = self.lock();
        let expired = match entries.get(&key.hash) {
            Some(entry) if entry.is_expired() => true,
            Some(entry) => return Ok(Some(entry.data.clone())),
            None => return Ok(None),
        };
        if expired {
            entries.pop(&key.hash);
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()> {
        let entry = StoredEntry::new(key.clone(), value.to_vec(), ttl);
        self.lock().put(key.hash.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.lock().pop(&key.hash).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.lock().iter().filter(|(_, e)| !e.is_expired()).count())
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self
            .lock()
            .iter()
            .filter(|(_, e)| !e.is_expired())
            .map(|(_, e)| e.key.clone())
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// No-op backend used when caching is disabled.
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NullBackend {
    async fn get(&self, _: &CacheKey) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    async fn set(&self, _: &CacheKey, _: &[u8], _: Duration) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    async fn keys(&self) -> Result<Vec<CacheKey>> {
        Ok(Vec::new())
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
