use async_trait::async_trait;

use crate::query::{Command, Expr, Query};

use super::{Entity, EntityId, Result};

/// Primary-key capability supplied by every repository adapter.
///
/// Lets callers build identity-based cache keys without knowing how the
/// backend discovers its keys.
pub trait PrimaryKeys<T: Entity>: Send + Sync {
    /// Names of the primary-key fields, in key order.
    fn primary_key_names(&self) -> Vec<String>;

    /// Primary-key values of `entity`, in the same order as the names.
    fn primary_key_values(&self, entity: &T) -> Result<EntityId>;
}

/// Uniform CRUD/query contract over a persistence backend.
///
/// Writes are staged by the backend's unit of work and become durable on
/// [`Repository::commit`]. "Not found" is `None` or an empty list, never an
/// error.
#[async_trait]
pub trait Repository<T: Entity>: PrimaryKeys<T> {
    /// Gets an entity by its primary key.
    async fn get_by_id(&self, id: &EntityId) -> Result<Option<T>>;

    /// Gets every entity whose primary key is in `ids`. Missing ids are skipped.
    async fn get_by_ids(&self, ids: &[EntityId]) -> Result<Vec<T>>;

    /// Runs a predicate query with optional paging and sorting.
    async fn find_all(&self, query: &Query) -> Result<Vec<T>>;

    /// Executes a raw backend command returning entities.
    async fn execute(&self, command: &Command) -> Result<Vec<T>>;

    /// Counts the entities matching `predicate` (all entities when `None`).
    async fn count(&self, predicate: Option<&Expr>) -> Result<u64>;

    /// Stages a new entity.
    async fn add(&self, entity: &T) -> Result<()>;

    /// Stages a change to an existing entity.
    async fn update(&self, entity: &T) -> Result<()>;

    /// Stages the removal of an entity.
    async fn remove(&self, entity: &T) -> Result<()>;

    /// Stages the removal of an entity by primary key.
    async fn remove_by_id(&self, id: &EntityId) -> Result<()>;

    /// Starts tracking an entity in the unit of work without changing it.
    async fn attach(&self, entity: &T) -> Result<()>;

    /// Stops tracking an entity in the unit of work. Writes staged for it are dropped.
    async fn detach(&self, entity: &T) -> Result<()>;

    /// Persists every staged write.
    async fn commit(&self) -> Result<()>;
}
