//! Commit-gated cache invalidations.

use tokio::sync::Mutex;

use repocache_core::cache::{CacheBackend, CachePolicy, Result};

use super::GenerationStore;

/// Cache effect of one write, applied once the write is committed.
///
/// Every variant finishes by bumping the generation of its entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingInvalidation {
    /// Writes the new serialized entity to its point key.
    Upsert {
        entity_type: &'static str,
        key: String,
        value: Vec<u8>,
    },
    /// Removes the point key.
    Evict {
        entity_type: &'static str,
        key: String,
    },
    /// Only bumps the generation; used when the point key is unknown.
    Bump { entity_type: &'static str },
}

impl PendingInvalidation {
    pub fn entity_type(&self) -> &'static str {
        match self {
            Self::Upsert { entity_type, .. }
            | Self::Evict { entity_type, .. }
            | Self::Bump { entity_type } => entity_type,
        }
    }

    /// Point key touched by this invalidation, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Upsert { key, .. } | Self::Evict { key, .. } => Some(key),
            Self::Bump { .. } => None,
        }
    }

    async fn apply_point(&self, cache: &dyn CacheBackend, policy: &CachePolicy) -> Result<()> {
        match self {
            Self::Upsert { key, value, .. } => cache.set(key, value, policy).await,
            Self::Evict { key, .. } => cache.remove(key).await.map(|_| ()),
            Self::Bump { .. } => Ok(()),
        }
    }
}

/// Ordered list of invalidations waiting for a successful commit.
///
/// One queue belongs to one unit of work. The mutex only provides interior
/// mutability behind `&self`; interleaving writes from concurrent units of
/// work on one queue is not supported.
#[derive(Debug, Default)]
pub struct DelayedInvalidationQueue {
    pending: Mutex<Vec<PendingInvalidation>>,
}

impl DelayedInvalidationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an invalidation behind every one already queued.
    pub async fn enqueue(&self, action: PendingInvalidation) {
        tracing::debug!(
            entity_type = action.entity_type(),
            key = action.key(),
            "Invalidation queued"
        );
        self.pending.lock().await.push(action);
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Returns a copy of the queued invalidations in application order.
    pub async fn snapshot(&self) -> Vec<PendingInvalidation> {
        self.pending.lock().await.clone()
    }

    /// Drops every queued invalidation without applying it. Returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    /// Drops the queued invalidations of one point key. Returns how many were dropped.
    pub async fn discard(&self, key: &str) -> usize {
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|action| action.key() != Some(key));
        before - pending.len()
    }

    /// Applies every queued invalidation in FIFO order and empties the queue.
    ///
    /// A backend error does not stop the flush: every point write and every
    /// generation bump is attempted. Whatever failed is queued again as a
    /// repair (an eviction of the point key, a bare generation bump) for the
    /// next flush, and the first error is returned. Returns the number of
    /// invalidations applied without error.
    pub async fn flush(
        &self,
        cache: &dyn CacheBackend,
        generations: &GenerationStore,
        policy: &CachePolicy,
    ) -> Result<usize> {
        let actions = std::mem::take(&mut *self.pending.lock().await);

        let mut first_error = None;
        let mut repairs: Vec<PendingInvalidation> = Vec::new();
        let mut applied = 0;

        for action in &actions {
            let entity_type = action.entity_type();
            let mut ok = true;

            if let Err(err) = action.apply_point(cache, policy).await {
                tracing::warn!(key = action.key(), error = %err, "Point key invalidation failed");
                if let Some(key) = action.key() {
                    repairs.push(PendingInvalidation::Evict {
                        entity_type,
                        key: key.to_string(),
                    });
                }
                first_error.get_or_insert(err);
                ok = false;
            }

            if let Err(err) = generations.bump(entity_type).await {
                tracing::warn!(entity_type, error = %err, "Generation bump failed");
                let repair = PendingInvalidation::Bump { entity_type };
                if !repairs.contains(&repair) {
                    repairs.push(repair);
                }
                first_error.get_or_insert(err);
                ok = false;
            }

            if ok {
                applied += 1;
            }
        }

        match first_error {
            None => {
                if applied > 0 {
                    tracing::debug!(applied, "Invalidations flushed");
                }
                Ok(applied)
            }
            Some(err) => {
                tracing::warn!(
                    applied,
                    failed = actions.len() - applied,
                    repairs = repairs.len(),
                    "Invalidation flush incomplete, repairs kept pending"
                );
                // Repairs go ahead of anything queued since the flush started
                let mut pending = self.pending.lock().await;
                repairs.append(&mut pending);
                *pending = repairs;
                Err(err)
            }
        }
    }
}
