//! In-memory repository implementation.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use repocache_core::query::{compare_values, lookup, Command, Expr, Query, SortDirection, SortSpec};
use repocache_core::storage::{
    Entity, EntityId, KeyValue, PrimaryKeys, Repository, RepositoryError, Result,
};

/// Handler answering a raw command against the committed rows.
pub type CommandHandler<T> = Arc<dyn Fn(&Command, &[T]) -> Result<Vec<T>> + Send + Sync>;

/// A write waiting for the next commit.
#[derive(Debug, Clone)]
enum StagedWrite<T> {
    Insert(EntityId, T),
    Update(EntityId, T),
    Delete(EntityId),
}

impl<T> StagedWrite<T> {
    fn id(&self) -> &EntityId {
        match self {
            Self::Insert(id, _) | Self::Update(id, _) | Self::Delete(id) => id,
        }
    }
}

/// In-memory storage backend for testing.
///
/// Committed rows live in a `BTreeMap` ordered by primary key and wrapped in
/// `Arc<RwLock<_>>` for thread-safe access. Writes are staged and only become
/// visible to reads after [`Repository::commit`]. Clones share all state.
///
/// Primary keys are read from the entity's JSON form using the configured
/// field names, so any serde entity works without extra glue.
pub struct InMemoryRepository<T: Entity> {
    key_names: Vec<String>,
    rows: Arc<RwLock<BTreeMap<EntityId, T>>>,
    staged: Arc<RwLock<Vec<StagedWrite<T>>>>,
    tracked: Arc<RwLock<HashSet<EntityId>>>,
    commands: Arc<HashMap<String, CommandHandler<T>>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl<T: Entity> Clone for InMemoryRepository<T> {
    fn clone(&self) -> Self {
        Self {
            key_names: self.key_names.clone(),
            rows: Arc::clone(&self.rows),
            staged: Arc::clone(&self.staged),
            tracked: Arc::clone(&self.tracked),
            commands: Arc::clone(&self.commands),
            fail_next_commit: Arc::clone(&self.fail_next_commit),
        }
    }
}

impl<T: Entity> fmt::Debug for InMemoryRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRepository")
            .field("entity_type", &T::entity_type())
            .field("key_names", &self.key_names)
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<T: Entity> InMemoryRepository<T> {
    /// Creates a new empty in-memory repository keyed by the given fields.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let repo = InMemoryRepository::<Customer>::new(["id"]);
    /// ```
    pub fn new<I, S>(key_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key_names: key_names.into_iter().map(Into::into).collect(),
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            staged: Arc::new(RwLock::new(Vec::new())),
            tracked: Arc::new(RwLock::new(HashSet::new())),
            commands: Arc::new(HashMap::new()),
            fail_next_commit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers a raw command answered by `handler`.
    ///
    /// Must be called before the repository is cloned; clones made earlier
    /// keep the previous command table.
    pub fn with_command<F>(mut self, text: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Command, &[T]) -> Result<Vec<T>> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.commands).insert(text.into(), Arc::new(handler));
        self
    }

    /// Makes the next commit fail with `CommitFailed`, keeping staged writes.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, AtomicOrdering::SeqCst);
    }

    /// Number of committed rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns true if no rows are committed.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Number of writes waiting for commit.
    pub async fn staged_len(&self) -> usize {
        self.staged.read().await.len()
    }

    /// Returns true if the entity with this id is tracked by the unit of work.
    pub async fn is_tracked(&self, id: &EntityId) -> bool {
        self.tracked.read().await.contains(id)
    }

    /// Whether `id` exists once the staged writes are applied.
    fn exists_after_staging(
        rows: &BTreeMap<EntityId, T>,
        staged: &[StagedWrite<T>],
        id: &EntityId,
    ) -> bool {
        staged
            .iter()
            .rev()
            .find(|write| write.id() == id)
            .map_or_else(
                || rows.contains_key(id),
                |write| !matches!(write, StagedWrite::Delete(_)),
            )
    }

    async fn stage(&self, write: StagedWrite<T>) -> Result<()> {
        let rows = self.rows.read().await;
        let mut staged = self.staged.write().await;
        let id = write.id().clone();
        let exists = Self::exists_after_staging(&rows, &staged, &id);

        match &write {
            StagedWrite::Insert(..) if exists => {
                return Err(RepositoryError::AlreadyExists {
                    entity_type: T::entity_type(),
                    id: id.to_string(),
                });
            }
            StagedWrite::Update(..) | StagedWrite::Delete(_) if !exists => {
                return Err(RepositoryError::NotFound {
                    entity_type: T::entity_type(),
                    id: id.to_string(),
                });
            }
            _ => {}
        }

        staged.push(write);
        drop(staged);
        drop(rows);

        self.tracked.write().await.insert(id);
        Ok(())
    }
}

fn to_view<T: Entity>(entity: &T) -> Result<Value> {
    serde_json::to_value(entity).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

/// Orders two JSON views by a sort specification. Missing fields sort first.
fn compare_by(sort: &SortSpec, left: &Value, right: &Value) -> Ordering {
    for field in &sort.fields {
        let ordering = match (lookup(left, &field.field), lookup(right, &field.field)) {
            (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ordering = match field.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Keeps the rows matching `predicate`, paired with their JSON views.
fn filter_rows<'a, T: Entity>(
    rows: impl Iterator<Item = &'a T>,
    predicate: Option<&Expr>,
) -> Result<Vec<(Value, T)>> {
    let mut matched = Vec::new();
    for row in rows {
        let view = to_view(row)?;
        let keep = match predicate {
            Some(expr) => expr.matches(&view)?,
            None => true,
        };
        if keep {
            matched.push((view, row.clone()));
        }
    }
    Ok(matched)
}

impl<T: Entity> PrimaryKeys<T> for InMemoryRepository<T> {
    fn primary_key_names(&self) -> Vec<String> {
        self.key_names.clone()
    }

    fn primary_key_values(&self, entity: &T) -> Result<EntityId> {
        let view = to_view(entity)?;
        let values = self
            .key_names
            .iter()
            .map(|name| {
                lookup(&view, name)
                    .and_then(KeyValue::from_json)
                    .ok_or_else(|| {
                        RepositoryError::InvalidData(format!(
                            "{} has no usable primary key field '{}'",
                            T::entity_type(),
                            name
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(EntityId::new(values))
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    async fn get_by_id(&self, id: &EntityId) -> Result<Option<T>> {
        let rows = self.rows.read().await;
        Ok(rows.get(id).cloned())
    }

    async fn get_by_ids(&self, ids: &[EntityId]) -> Result<Vec<T>> {
        let rows = self.rows.read().await;
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn find_all(&self, query: &Query) -> Result<Vec<T>> {
        let rows = self.rows.read().await;
        let mut matched = filter_rows(rows.values(), query.predicate.as_ref())?;
        drop(rows);

        if !query.sort.is_empty() {
            // Stable sort keeps primary-key order between equal rows
            matched.sort_by(|(a, _), (b, _)| compare_by(&query.sort, a, b));
        }

        Ok(matched
            .into_iter()
            .map(|(_, row)| row)
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn execute(&self, command: &Command) -> Result<Vec<T>> {
        let handler = self.commands.get(&command.text).ok_or_else(|| {
            RepositoryError::QueryFailed(format!("unknown command: {}", command.text))
        })?;

        let rows: Vec<T> = self.rows.read().await.values().cloned().collect();
        handler(command, &rows)
    }

    async fn count(&self, predicate: Option<&Expr>) -> Result<u64> {
        let rows = self.rows.read().await;
        let matched = match predicate {
            Some(_) => filter_rows(rows.values(), predicate)?.len(),
            None => rows.len(),
        };
        Ok(matched as u64)
    }

    async fn add(&self, entity: &T) -> Result<()> {
        let id = self.primary_key_values(entity)?;
        self.stage(StagedWrite::Insert(id, entity.clone())).await
    }

    async fn update(&self, entity: &T) -> Result<()> {
        let id = self.primary_key_values(entity)?;
        self.stage(StagedWrite::Update(id, entity.clone())).await
    }

    async fn remove(&self, entity: &T) -> Result<()> {
        let id = self.primary_key_values(entity)?;
        self.remove_by_id(&id).await
    }

    async fn remove_by_id(&self, id: &EntityId) -> Result<()> {
        self.stage(StagedWrite::Delete(id.clone())).await
    }

    async fn attach(&self, entity: &T) -> Result<()> {
        let id = self.primary_key_values(entity)?;
        self.tracked.write().await.insert(id);
        Ok(())
    }

    async fn detach(&self, entity: &T) -> Result<()> {
        let id = self.primary_key_values(entity)?;
        self.tracked.write().await.remove(&id);
        // A detached entity takes its pending writes with it
        self.staged.write().await.retain(|write| write.id() != &id);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        if self.fail_next_commit.swap(false, AtomicOrdering::SeqCst) {
            return Err(RepositoryError::CommitFailed(format!(
                "{} commit rejected",
                T::entity_type()
            )));
        }

        let mut rows = self.rows.write().await;
        let mut staged = self.staged.write().await;
        for write in staged.drain(..) {
            match write {
                StagedWrite::Insert(id, entity) | StagedWrite::Update(id, entity) => {
                    rows.insert(id, entity);
                }
                StagedWrite::Delete(id) => {
                    rows.remove(&id);
                }
            }
        }
        drop(staged);
        drop(rows);

        self.tracked.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Customer {
        id: i64,
        name: String,
        active: bool,
    }

    impl Entity for Customer {
        fn entity_type() -> &'static str {
            "Customer"
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderLine {
        order: String,
        line: i64,
        sku: String,
    }

    impl Entity for OrderLine {
        fn entity_type() -> &'static str {
            "OrderLine"
        }
    }

    fn customer(id: i64, name: &str, active: bool) -> Customer {
        Customer {
            id,
            name: name.to_string(),
            active,
        }
    }

    async fn seeded() -> InMemoryRepository<Customer> {
        let repo = InMemoryRepository::<Customer>::new(["id"]);
        repo.add(&customer(1, "Carol", true)).await.unwrap();
        repo.add(&customer(2, "Alice", false)).await.unwrap();
        repo.add(&customer(3, "Bob", true)).await.unwrap();
        repo.commit().await.unwrap();
        repo
    }

    #[tokio::test]
    async fn test_writes_are_invisible_until_commit() {
        let repo = InMemoryRepository::<Customer>::new(["id"]);
        repo.add(&customer(1, "Carol", true)).await.unwrap();

        assert!(repo.get_by_id(&EntityId::from(1)).await.unwrap().is_none());
        assert_eq!(repo.staged_len().await, 1);

        repo.commit().await.unwrap();

        assert_eq!(
            repo.get_by_id(&EntityId::from(1)).await.unwrap(),
            Some(customer(1, "Carol", true))
        );
        assert_eq!(repo.staged_len().await, 0);
    }

    #[tokio::test]
    async fn test_add_duplicate_fails() {
        let repo = seeded().await;
        let result = repo.add(&customer(1, "Again", true)).await;
        assert!(matches!(
            result,
            Err(RepositoryError::AlreadyExists {
                entity_type: "Customer",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_add_duplicate_within_unit_of_work_fails() {
        let repo = InMemoryRepository::<Customer>::new(["id"]);
        repo.add(&customer(9, "Zed", true)).await.unwrap();
        assert!(repo.add(&customer(9, "Zed", true)).await.is_err());
    }

    #[tokio::test]
    async fn test_update_missing_fails() {
        let repo = seeded().await;
        let result = repo.update(&customer(99, "Nobody", true)).await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_remove_then_add_same_id_in_one_unit_of_work() {
        let repo = seeded().await;
        repo.remove_by_id(&EntityId::from(1)).await.unwrap();
        repo.add(&customer(1, "Carol II", true)).await.unwrap();
        repo.commit().await.unwrap();

        let found = repo.get_by_id(&EntityId::from(1)).await.unwrap().unwrap();
        assert_eq!(found.name, "Carol II");
    }

    #[tokio::test]
    async fn test_remove_entity() {
        let repo = seeded().await;
        repo.remove(&customer(2, "Alice", false)).await.unwrap();
        repo.commit().await.unwrap();

        assert!(repo.get_by_id(&EntityId::from(2)).await.unwrap().is_none());
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_staged_writes() {
        let repo = seeded().await;
        repo.update(&customer(1, "Renamed", true)).await.unwrap();
        repo.fail_next_commit();

        let result = repo.commit().await;
        assert!(matches!(result, Err(RepositoryError::CommitFailed(_))));
        assert_eq!(repo.staged_len().await, 1);
        assert_eq!(
            repo.get_by_id(&EntityId::from(1)).await.unwrap().unwrap().name,
            "Carol"
        );

        // The failure hook is one-shot
        repo.commit().await.unwrap();
        assert_eq!(
            repo.get_by_id(&EntityId::from(1)).await.unwrap().unwrap().name,
            "Renamed"
        );
    }

    #[tokio::test]
    async fn test_get_by_ids_skips_missing() {
        let repo = seeded().await;
        let ids = [EntityId::from(3), EntityId::from(42), EntityId::from(1)];
        let found = repo.get_by_ids(&ids).await.unwrap();

        let names: Vec<_> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Carol"]);
    }

    #[tokio::test]
    async fn test_find_all_filters_sorts_and_pages() {
        let repo = seeded().await;

        let query = Query::filter(Expr::field("active").equals(true)).order_by("name");
        let names: Vec<_> = repo
            .find_all(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Bob", "Carol"]);

        let page = Query::all().order_by_desc("name").skip(1).take(1);
        let names: Vec<_> = repo
            .find_all(&page)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Bob"]);
    }

    #[tokio::test]
    async fn test_find_all_without_sort_uses_key_order() {
        let repo = seeded().await;
        let ids: Vec<_> = repo
            .find_all(&Query::all())
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_find_all_reports_bad_predicate() {
        let repo = seeded().await;
        let query = Query::filter(Expr::field("name").gt(Expr::value(1).plus("x")));
        assert!(matches!(
            repo.find_all(&query).await,
            Err(RepositoryError::Predicate(_))
        ));
    }

    #[tokio::test]
    async fn test_count() {
        let repo = seeded().await;
        assert_eq!(repo.count(None).await.unwrap(), 3);

        let active = Expr::field("active").equals(true);
        assert_eq!(repo.count(Some(&active)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_execute_registered_command() {
        let repo = InMemoryRepository::<Customer>::new(["id"]).with_command(
            "name_prefix",
            |command, rows| {
                let prefix = command
                    .get("prefix")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(rows
                    .iter()
                    .filter(|c| c.name.starts_with(&prefix))
                    .cloned()
                    .collect())
            },
        );
        repo.add(&customer(1, "Bob", true)).await.unwrap();
        repo.add(&customer(2, "Alice", true)).await.unwrap();
        repo.commit().await.unwrap();

        let found = repo
            .execute(&Command::new("name_prefix").param("prefix", "Al"))
            .await
            .unwrap();
        assert_eq!(found, vec![customer(2, "Alice", true)]);
    }

    #[tokio::test]
    async fn test_execute_unknown_command_fails() {
        let repo = seeded().await;
        let result = repo.execute(&Command::new("nope")).await;
        assert_eq!(
            result,
            Err(RepositoryError::QueryFailed("unknown command: nope".to_string()))
        );
    }

    #[tokio::test]
    async fn test_attach_and_detach() {
        let repo = seeded().await;
        let bob = customer(3, "Bob", true);

        repo.attach(&bob).await.unwrap();
        assert!(repo.is_tracked(&EntityId::from(3)).await);

        repo.update(&customer(3, "Robert", true)).await.unwrap();
        repo.detach(&bob).await.unwrap();
        assert!(!repo.is_tracked(&EntityId::from(3)).await);
        assert_eq!(repo.staged_len().await, 0);

        repo.commit().await.unwrap();
        assert_eq!(
            repo.get_by_id(&EntityId::from(3)).await.unwrap().unwrap().name,
            "Bob"
        );
    }

    #[tokio::test]
    async fn test_composite_primary_key() {
        let repo = InMemoryRepository::<OrderLine>::new(["order", "line"]);
        let line = OrderLine {
            order: "A-1".to_string(),
            line: 2,
            sku: "widget".to_string(),
        };

        assert_eq!(repo.primary_key_names(), vec!["order", "line"]);
        let id = repo.primary_key_values(&line).unwrap();
        assert_eq!(id, EntityId::new(vec![KeyValue::from("A-1"), KeyValue::from(2)]));

        repo.add(&line).await.unwrap();
        repo.commit().await.unwrap();
        assert_eq!(repo.get_by_id(&id).await.unwrap(), Some(line));
    }

    #[test]
    fn test_missing_key_field_is_invalid_data() {
        let repo = InMemoryRepository::<Customer>::new(["customer_id"]);
        let result = repo.primary_key_values(&customer(1, "Carol", true));
        assert!(matches!(result, Err(RepositoryError::InvalidData(_))));
    }
}
