use async_trait::async_trait;

use super::{CachePolicy, Result};

/// Pluggable key/value store used by the caching repository.
///
/// Implementations must make [`CacheBackend::increment`] atomic across every
/// client that shares the store; generation counters rely on it.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Gets a value from the cache by key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Sets a value in the cache under the given expiration policy.
    async fn set(&self, key: &str, value: &[u8], policy: &CachePolicy) -> Result<()>;

    /// Removes a value from the cache. Returns true if a live entry was removed.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Returns true if a live entry exists for the key.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically increments the counter at `key` and returns the new value.
    ///
    /// An absent counter is treated as holding `initial`, so the first call
    /// returns `initial + delta`. Counters are stored as decimal text and are
    /// readable through [`CacheBackend::get`].
    async fn increment(&self, key: &str, initial: u64, delta: u64) -> Result<u64>;

    /// Drops every entry owned by this backend.
    async fn clear(&self) -> Result<()>;
}
