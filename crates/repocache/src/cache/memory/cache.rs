//! In-memory cache implementation with LRU eviction.
//!
//! Provides a thread-safe in-memory cache with TTL support using
//! tokio synchronization primitives and LRU eviction policy.
//!
//! Generation counters are ordinary entries holding decimal text, so they
//! are subject to the same LRU eviction as cached values. An evicted counter
//! restarts from its initial value on the next increment.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use lru::LruCache;
use tokio::sync::RwLock;

use repocache_core::cache::{deserialize_counter, CacheBackend, CacheError, CachePolicy, Result};

/// Capacity used when a zero capacity is requested.
const MIN_ENTRIES: NonZeroUsize = NonZeroUsize::MIN;

/// A single cache entry with optional expiration.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    /// Creates a new cache entry from an expiration policy.
    fn new(value: Vec<u8>, policy: &CachePolicy) -> Self {
        let expires_at = policy.remaining(Utc::now()).map(|d| Instant::now() + d);
        Self { value, expires_at }
    }

    /// Creates an entry that never expires.
    fn persistent(value: Vec<u8>) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Returns true if this entry has expired.
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// In-memory cache implementation with LRU eviction.
///
/// Thread-safe cache using `Arc<RwLock<LruCache>>` for concurrent access.
/// Supports TTL with lazy expiration (entries are cleaned up on access).
/// Uses LRU eviction to limit memory usage when max_entries is reached.
///
/// `increment` runs under the store's write lock, which makes it atomic for
/// every clone of this cache inside one process.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    store: Arc<RwLock<LruCache<String, CacheEntry>>>,
}

impl MemoryCache {
    /// Creates a new in-memory cache with LRU eviction.
    ///
    /// # Arguments
    ///
    /// * `max_entries` - Maximum number of entries before LRU eviction kicks in.
    ///   A value of 0 is raised to 1.
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(MIN_ENTRIES);
        Self {
            store: Arc::new(RwLock::new(LruCache::new(capacity))),
        }
    }

    /// Number of entries currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    /// Returns true if no entries are held.
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut store = self.store.write().await;

        let expired = match store.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };

        // Lazy cleanup of the expired entry
        if expired {
            store.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], policy: &CachePolicy) -> Result<()> {
        let mut store = self.store.write().await;
        let entry = CacheEntry::new(value.to_vec(), policy);
        store.put(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let mut store = self.store.write().await;
        Ok(store.pop(key).is_some_and(|entry| !entry.is_expired()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let store = self.store.read().await;
        Ok(store.peek(key).is_some_and(|entry| !entry.is_expired()))
    }

    async fn increment(&self, key: &str, initial: u64, delta: u64) -> Result<u64> {
        let mut store = self.store.write().await;

        let current = match store.get(key) {
            Some(entry) if !entry.is_expired() => {
                deserialize_counter(&entry.value).ok_or_else(|| CacheError::InvalidCounter {
                    key: key.to_string(),
                    value: String::from_utf8_lossy(&entry.value).into_owned(),
                })?
            }
            _ => initial,
        };

        let next = current
            .checked_add(delta)
            .ok_or_else(|| CacheError::OperationFailed(format!("counter overflow at {key}")))?;
        store.put(
            key.to_string(),
            CacheEntry::persistent(next.to_string().into_bytes()),
        );
        Ok(next)
    }

    async fn clear(&self) -> Result<()> {
        self.store.write().await.clear();
        Ok(())
    }
}
