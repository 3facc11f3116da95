//! Caching repository decorator.
//!
//! Wraps any `Repository<T>` with a read-through cache whose query results are
//! invalidated in bulk by per-type generation counters.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use repocache_core::cache::{
    command_key, count_key, deserialize_value, generation_key, point_key, query_key,
    serialize_value, CacheBackend, CacheError, CachePolicy,
};
use repocache_core::query::{Command, Expr, Query};
use repocache_core::storage::{
    Entity, EntityId, PrimaryKeys, Repository, RepositoryError, Result,
};

use super::{DelayedInvalidationQueue, GenerationStore, PendingInvalidation};
use crate::cache::MemoryCache;

/// Default expiration of cached entries.
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Capacity of the in-memory backend created when none is supplied.
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Tunables of a [`CachingRepository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Expiration applied to every entry the decorator writes.
    pub policy: CachePolicy,
    /// When true, backend failures are logged and treated as cache misses
    /// instead of being returned to the caller.
    pub fail_open: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            policy: CachePolicy::ttl(DEFAULT_TTL),
            fail_open: false,
        }
    }
}

/// Generational read-through caching decorator.
///
/// - **Point reads**: `get_by_id` / `get_by_ids` check `{type}/GetById/...`
///   keys first and write misses through.
/// - **Query reads**: `find_all`, `execute` and `count` are cached under
///   `{type}/{generation}/{hash}` keys and fully materialized.
/// - **Writes**: delegated immediately. A successful write queues its cache
///   effect, which is applied by [`Repository::commit`] only after the
///   underlying commit succeeds.
///
/// # Type Parameters
///
/// * `T` - The entity type
/// * `R` - The underlying repository implementation
pub struct CachingRepository<T, R>
where
    T: Entity,
    R: Repository<T>,
{
    repository: Arc<R>,
    cache: Arc<dyn CacheBackend>,
    generations: GenerationStore,
    queue: DelayedInvalidationQueue,
    options: CacheOptions,
    _entity: PhantomData<fn() -> T>,
}

impl<T, R> CachingRepository<T, R>
where
    T: Entity,
    R: Repository<T>,
{
    /// Creates a new caching repository.
    ///
    /// # Arguments
    ///
    /// * `repository` - The underlying repository to cache
    /// * `cache` - Backend to use; an in-memory LRU cache is created when `None`
    /// * `options` - Expiration policy and failure handling
    pub fn new(
        repository: Arc<R>,
        cache: Option<Arc<dyn CacheBackend>>,
        options: CacheOptions,
    ) -> Self {
        let cache = cache.unwrap_or_else(|| {
            Arc::new(MemoryCache::new(DEFAULT_MAX_ENTRIES)) as Arc<dyn CacheBackend>
        });
        Self {
            repository,
            generations: GenerationStore::new(Arc::clone(&cache)),
            cache,
            queue: DelayedInvalidationQueue::new(),
            options,
            _entity: PhantomData,
        }
    }

    /// Starts building a caching repository.
    pub fn builder() -> CachingRepositoryBuilder<T, R> {
        CachingRepositoryBuilder::default()
    }

    /// The wrapped repository.
    pub fn inner(&self) -> &Arc<R> {
        &self.repository
    }

    /// The cache backend shared with the generation store.
    pub fn cache(&self) -> &Arc<dyn CacheBackend> {
        &self.cache
    }

    pub fn generations(&self) -> &GenerationStore {
        &self.generations
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Number of invalidations waiting for the next successful commit.
    pub async fn pending_invalidations(&self) -> usize {
        self.queue.len().await
    }

    /// Empties the whole cache backend and drops every queued invalidation.
    pub async fn clear(&self) -> Result<()> {
        let dropped = self.queue.clear().await;
        self.cache.clear().await?;
        tracing::debug!(entity_type = T::entity_type(), dropped, "Cache cleared");
        Ok(())
    }

    /// Turns a backend failure into a miss when failing open.
    fn absorb(&self, err: CacheError, key: &str) -> Result<()> {
        if self.options.fail_open {
            tracing::warn!(key = %key, error = %err, "Cache backend failed, bypassing cache");
            Ok(())
        } else {
            Err(err.into())
        }
    }

    fn point_key(&self, id: &EntityId) -> String {
        point_key(T::entity_type(), &self.repository.primary_key_names(), id)
    }

    /// Reads and decodes a cached value. Undecodable entries are misses.
    async fn cache_get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match deserialize_value(&bytes) {
                Ok(value) => {
                    tracing::trace!(key = %key, "Cache hit");
                    Ok(Some(value))
                }
                Err(err) => {
                    // Deserialization failed - treat as cache miss
                    tracing::warn!(key = %key, error = %err, "Cached value deserialization failed");
                    Ok(None)
                }
            },
            Ok(None) => {
                tracing::trace!(key = %key, "Cache miss");
                Ok(None)
            }
            Err(err) => self.absorb(err, key).map(|()| None),
        }
    }

    async fn cache_set<V: Serialize + Sync>(&self, key: &str, value: &V) -> Result<()> {
        let result = match serialize_value(value) {
            Ok(bytes) => self.cache.set(key, &bytes, &self.options.policy).await,
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) => self.absorb(err, key),
        }
    }

    /// Current generation of `T`, or `None` when failing open past a backend error.
    async fn query_generation(&self) -> Result<Option<u64>> {
        match self.generations.current(T::entity_type()).await {
            Ok(generation) => Ok(Some(generation)),
            Err(err) => self
                .absorb(err, &generation_key(T::entity_type()))
                .map(|()| None),
        }
    }

    /// Serves `key` from the cache, or loads, stores and returns the value.
    async fn read_through<V, F, Fut>(&self, key: &str, load: F) -> Result<V>
    where
        V: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V>> + Send,
    {
        if let Some(value) = self.cache_get(key).await? {
            return Ok(value);
        }

        let value = load().await?;
        self.cache_set(key, &value).await?;
        Ok(value)
    }

    /// Point key of an entity that was already handed to the repository.
    ///
    /// When no key can be extracted only a generation bump is queued.
    async fn written_key(&self, entity: &T) -> Option<String> {
        match self.repository.primary_key_values(entity) {
            Ok(id) => Some(self.point_key(&id)),
            Err(err) => {
                tracing::warn!(
                    entity_type = T::entity_type(),
                    error = %err,
                    "Primary key extraction failed, queueing generation bump only"
                );
                self.queue
                    .enqueue(PendingInvalidation::Bump {
                        entity_type: T::entity_type(),
                    })
                    .await;
                None
            }
        }
    }

    /// Queues the point-key write-through and generation bump for an added or updated entity.
    async fn schedule_upsert(&self, entity: &T) {
        let Some(key) = self.written_key(entity).await else {
            return;
        };
        let action = match serialize_value(entity) {
            Ok(value) => PendingInvalidation::Upsert {
                entity_type: T::entity_type(),
                key,
                value,
            },
            Err(err) => {
                // Still invalidate so the stale entry cannot be served
                tracing::warn!(key = %key, error = %err, "Entity serialization failed");
                PendingInvalidation::Evict {
                    entity_type: T::entity_type(),
                    key,
                }
            }
        };
        self.queue.enqueue(action).await;
    }

    async fn schedule_evict(&self, key: String) {
        self.queue
            .enqueue(PendingInvalidation::Evict {
                entity_type: T::entity_type(),
                key,
            })
            .await;
    }
}

impl<T, R> PrimaryKeys<T> for CachingRepository<T, R>
where
    T: Entity,
    R: Repository<T>,
{
    fn primary_key_names(&self) -> Vec<String> {
        self.repository.primary_key_names()
    }

    fn primary_key_values(&self, entity: &T) -> Result<EntityId> {
        self.repository.primary_key_values(entity)
    }
}

#[async_trait]
impl<T, R> Repository<T> for CachingRepository<T, R>
where
    T: Entity,
    R: Repository<T> + 'static,
{
    async fn get_by_id(&self, id: &EntityId) -> Result<Option<T>> {
        let key = self.point_key(id);

        if let Some(entity) = self.cache_get::<T>(&key).await? {
            return Ok(Some(entity));
        }

        let entity = self.repository.get_by_id(id).await?;
        if let Some(ref e) = entity {
            self.cache_set(&key, e).await?;
        }
        Ok(entity)
    }

    async fn get_by_ids(&self, ids: &[EntityId]) -> Result<Vec<T>> {
        let mut slots: Vec<Option<T>> = Vec::with_capacity(ids.len());
        let mut misses = Vec::new();

        for id in ids {
            let hit = self.cache_get::<T>(&self.point_key(id)).await?;
            if hit.is_none() {
                misses.push(id.clone());
            }
            slots.push(hit);
        }

        if !misses.is_empty() {
            tracing::trace!(
                entity_type = T::entity_type(),
                hits = ids.len() - misses.len(),
                misses = misses.len(),
                "Fetching missed entities"
            );

            let mut fetched = HashMap::new();
            for entity in self.repository.get_by_ids(&misses).await? {
                let id = self.repository.primary_key_values(&entity)?;
                self.cache_set(&self.point_key(&id), &entity).await?;
                fetched.insert(id, entity);
            }

            for (slot, id) in slots.iter_mut().zip(ids) {
                if slot.is_none() {
                    *slot = fetched.get(id).cloned();
                }
            }
        }

        // Caller order is kept; ids that do not exist are left out
        Ok(slots.into_iter().flatten().collect())
    }

    async fn find_all(&self, query: &Query) -> Result<Vec<T>> {
        let Some(generation) = self.query_generation().await? else {
            return self.repository.find_all(query).await;
        };

        let key = query_key(T::entity_type(), query, generation)?;
        self.read_through(&key, || self.repository.find_all(query)).await
    }

    async fn execute(&self, command: &Command) -> Result<Vec<T>> {
        let Some(generation) = self.query_generation().await? else {
            return self.repository.execute(command).await;
        };

        let key = command_key(T::entity_type(), command, generation);
        self.read_through(&key, || self.repository.execute(command)).await
    }

    async fn count(&self, predicate: Option<&Expr>) -> Result<u64> {
        let Some(generation) = self.query_generation().await? else {
            return self.repository.count(predicate).await;
        };

        let key = count_key(T::entity_type(), predicate, generation)?;
        self.read_through(&key, || self.repository.count(predicate)).await
    }

    async fn add(&self, entity: &T) -> Result<()> {
        self.repository.add(entity).await?;
        self.schedule_upsert(entity).await;
        Ok(())
    }

    async fn update(&self, entity: &T) -> Result<()> {
        self.repository.update(entity).await?;
        self.schedule_upsert(entity).await;
        Ok(())
    }

    async fn remove(&self, entity: &T) -> Result<()> {
        self.repository.remove(entity).await?;
        if let Some(key) = self.written_key(entity).await {
            self.schedule_evict(key).await;
        }
        Ok(())
    }

    async fn remove_by_id(&self, id: &EntityId) -> Result<()> {
        self.repository.remove_by_id(id).await?;
        self.schedule_evict(self.point_key(id)).await;
        Ok(())
    }

    async fn attach(&self, entity: &T) -> Result<()> {
        self.repository.attach(entity).await
    }

    /// Detaching drops the entity's staged writes, so their queued cache
    /// effects are dropped with them.
    async fn detach(&self, entity: &T) -> Result<()> {
        self.repository.detach(entity).await?;
        let key = self.point_key(&self.repository.primary_key_values(entity)?);
        let discarded = self.queue.discard(&key).await;
        if discarded > 0 {
            tracing::debug!(key = %key, discarded, "Invalidations discarded on detach");
        }
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        // 1. Persist; a failure leaves the queue untouched
        if let Err(err) = self.repository.commit().await {
            tracing::debug!(
                entity_type = T::entity_type(),
                error = %err,
                "Commit failed, invalidations kept pending"
            );
            return Err(err);
        }

        // 2. Reflect the persisted writes in the cache
        match self
            .queue
            .flush(self.cache.as_ref(), &self.generations, &self.options.policy)
            .await
        {
            Ok(_) => Ok(()),
            // Repairs for whatever failed stay queued for the next commit
            Err(err) => self.absorb(err, &generation_key(T::entity_type())),
        }
    }
}

/// Builder for [`CachingRepository`].
pub struct CachingRepositoryBuilder<T, R>
where
    T: Entity,
    R: Repository<T>,
{
    repository: Option<Arc<R>>,
    cache: Option<Arc<dyn CacheBackend>>,
    options: CacheOptions,
    _entity: PhantomData<fn() -> T>,
}

impl<T, R> Default for CachingRepositoryBuilder<T, R>
where
    T: Entity,
    R: Repository<T>,
{
    fn default() -> Self {
        Self {
            repository: None,
            cache: None,
            options: CacheOptions::default(),
            _entity: PhantomData,
        }
    }
}

impl<T, R> CachingRepositoryBuilder<T, R>
where
    T: Entity,
    R: Repository<T>,
{
    /// Sets the repository to wrap. Required.
    pub fn repository(mut self, repository: Arc<R>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Sets a pre-built cache backend. Defaults to an in-memory LRU cache.
    pub fn cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.options.policy = policy;
        self
    }

    pub fn fail_open(mut self, fail_open: bool) -> Self {
        self.options.fail_open = fail_open;
        self
    }

    pub fn options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the decorator.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::MissingRepository` when no repository was set.
    pub fn build(self) -> Result<CachingRepository<T, R>> {
        let repository = self.repository.ok_or(RepositoryError::MissingRepository)?;
        Ok(CachingRepository::new(repository, self.cache, self.options))
    }
}
