//! Per-entity-type generation counters.

use std::fmt;
use std::sync::Arc;

use repocache_core::cache::{
    deserialize_counter, generation_key, CacheBackend, CacheError, Result,
};

/// Monotonic generation counter per entity type, kept inside the cache backend.
///
/// Every wrapper sharing a backend shares these counters. The backend may
/// evict a counter; it then reads as [`GenerationStore::INITIAL`] again and
/// query keys stamped with a higher generation are orphaned until they expire.
#[derive(Clone)]
pub struct GenerationStore {
    cache: Arc<dyn CacheBackend>,
}

impl fmt::Debug for GenerationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationStore").finish_non_exhaustive()
    }
}

impl GenerationStore {
    /// Generation of a type whose counter does not exist.
    pub const INITIAL: u64 = 1;

    pub fn new(cache: Arc<dyn CacheBackend>) -> Self {
        Self { cache }
    }

    /// Reads the current generation without creating the counter.
    pub async fn current(&self, entity_type: &str) -> Result<u64> {
        let key = generation_key(entity_type);
        match self.cache.get(&key).await? {
            None => Ok(Self::INITIAL),
            Some(bytes) => {
                deserialize_counter(&bytes).ok_or_else(|| CacheError::InvalidCounter {
                    key,
                    value: String::from_utf8_lossy(&bytes).into_owned(),
                })
            }
        }
    }

    /// Atomically advances the generation and returns the new value.
    pub async fn bump(&self, entity_type: &str) -> Result<u64> {
        let generation = self
            .cache
            .increment(&generation_key(entity_type), Self::INITIAL, 1)
            .await?;
        tracing::debug!(entity_type, generation, "Generation bumped");
        Ok(generation)
    }
}
