//! Key/value stores backing the remote cache.
//!
//! Values are raw JSON bytes keyed by the full request URL. Every entry
//! carries a TTL; an expired entry reads as absent.

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::CacheResult;

/// Storage backend for cached upstream responses.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a live entry.
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>>;

    /// Write an entry, replacing any previous value and resetting its TTL.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()>;

    /// Remove an entry if present.
    async fn delete(&self, key: &str) -> CacheResult<()>;
}

struct MemoryEntry {
    data: Bytes,
    inserted_at: Instant,
    ttl: Duration,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// Counters for the in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStoreStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub expired: AtomicU64,
}

impl MemoryStoreStats {
    /// Hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }
}

/// In-process LRU store with lazy TTL expiry.
///
/// Expired entries are removed when read. Once `capacity` entries are
/// held, the least recently used one is evicted on insert.
pub struct MemoryStore {
    cache: RwLock<LruCache<String, MemoryEntry>>,
    stats: MemoryStoreStats,
}

impl MemoryStore {
    /// Create a store holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        debug!(capacity = capacity.get(), "Creating in-memory cache store");

        Self {
            cache: RwLock::new(LruCache::new(capacity)),
            stats: MemoryStoreStats::default(),
        }
    }

    /// Number of entries currently held, including expired ones not yet read.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Access counters.
    pub fn stats(&self) -> &MemoryStoreStats {
        &self.stats
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let mut cache = self.cache.write().await;

        let expired = match cache.get(key) {
            Some(entry) if entry.is_expired() => true,
            Some(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.data.clone()));
            }
            None => false,
        };

        if expired {
            cache.pop(key);
            self.stats.expired.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache entry expired");
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()> {
        let entry = MemoryEntry {
            data: value,
            inserted_at: Instant::now(),
            ttl,
        };
        self.cache.write().await.put(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.cache.write().await.pop(key);
        Ok(())
    }
}
