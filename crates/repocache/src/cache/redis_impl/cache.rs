//! Redis cache implementation.
//!
//! Every key is stored under a namespace prefix (`{namespace}:{key}`) so that
//! several deployments can share one Redis database and `clear` only touches
//! its own keys.
//!
//! # Counters
//!
//! Generation counters are plain Redis strings holding an integer. The
//! increment runs as a `MULTI`/`EXEC` pipeline of `SET key initial NX`
//! followed by `INCRBY key delta`, which seeds an absent counter and bumps it
//! in one atomic step for every client of the database.
//!
//! # Clearing
//!
//! `clear` walks the namespace with `SCAN` and deletes in batches. It is not
//! atomic: keys written concurrently may survive.

use async_trait::async_trait;
use redis::AsyncCommands;

use repocache_core::cache::{CacheBackend, CachePolicy, Result};

use super::error::map_redis_error;

/// Keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// Redis cache backend using connection manager for pooling.
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
    namespace: String,
}

impl RedisCache {
    /// Creates a new Redis cache connection.
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `namespace` - Prefix applied to every key
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established.
    pub async fn new(url: &str, namespace: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;
        Ok(Self {
            conn,
            namespace: namespace.into(),
        })
    }

    /// Returns the namespace prefix of this cache.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn namespaced(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.namespace, key)
        }
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let result: Option<Vec<u8>> = conn
            .get(self.namespaced(key))
            .await
            .map_err(map_redis_error)?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &[u8], policy: &CachePolicy) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = self.namespaced(key);

        match policy.remaining(chrono::Utc::now()) {
            None => conn
                .set::<_, _, ()>(&key, value)
                .await
                .map_err(map_redis_error)?,
            // A deadline that already passed leaves nothing to store
            Some(duration) if duration.is_zero() => conn
                .del::<_, ()>(&key)
                .await
                .map_err(map_redis_error)?,
            Some(duration) => {
                let seconds = duration.as_secs().max(1);
                conn.set_ex::<_, _, ()>(&key, value, seconds)
                    .await
                    .map_err(map_redis_error)?
            }
        }

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .del(self.namespaced(key))
            .await
            .map_err(map_redis_error)?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .exists(self.namespaced(key))
            .await
            .map_err(map_redis_error)?;
        Ok(exists)
    }

    async fn increment(&self, key: &str, initial: u64, delta: u64) -> Result<u64> {
        let mut conn = self.conn.clone();
        let key = self.namespaced(key);

        let (value,): (u64,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&key)
            .arg(initial)
            .arg("NX")
            .ignore()
            .cmd("INCRBY")
            .arg(&key)
            .arg(delta)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(value)
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pattern = self.namespaced("*");
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;

            if !keys.is_empty() {
                conn.del::<_, ()>(keys).await.map_err(map_redis_error)?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use std::time::Duration;
    use uuid::Uuid;

    /// Helper to get Redis URL from environment.
    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    /// Skip test if Redis not available. Each cache gets a fresh namespace.
    async fn get_test_cache() -> Option<RedisCache> {
        let namespace = format!("test:repocache:{}", Uuid::new_v4());
        RedisCache::new(&redis_url(), namespace).await.ok()
    }

    #[tokio::test]
    async fn test_redis_set_and_get() {
        let Some(cache) = get_test_cache().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let value = b"hello world";
        cache
            .set("Customer/GetById/id=1", value, &CachePolicy::NoExpiration)
            .await
            .unwrap();

        let result = cache.get("Customer/GetById/id=1").await.unwrap();
        assert_eq!(result, Some(value.to_vec()));

        cache.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_get_nonexistent() {
        let Some(cache) = get_test_cache().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        assert_eq!(cache.get("nonexistent").await.unwrap(), None);
        assert!(!cache.exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_redis_remove_reports_presence() {
        let Some(cache) = get_test_cache().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        cache
            .set("key", b"to be deleted", &CachePolicy::NoExpiration)
            .await
            .unwrap();

        assert!(cache.remove("key").await.unwrap());
        assert!(cache.get("key").await.unwrap().is_none());
        assert!(!cache.remove("key").await.unwrap());
    }

    #[tokio::test]
    async fn test_redis_ttl() {
        let Some(cache) = get_test_cache().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        cache
            .set("short", b"short-lived", &CachePolicy::ttl(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(cache.exists("short").await.unwrap());

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(cache.get("short").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_redis_past_deadline_stores_nothing() {
        let Some(cache) = get_test_cache().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let policy = CachePolicy::absolute(Utc::now() - TimeDelta::seconds(5));
        cache.set("stale", b"value", &policy).await.unwrap();

        assert!(cache.get("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_redis_increment_seeds_and_bumps() {
        let Some(cache) = get_test_cache().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        assert_eq!(cache.increment("Customer/Generation", 1, 1).await.unwrap(), 2);
        assert_eq!(cache.increment("Customer/Generation", 1, 1).await.unwrap(), 3);

        let raw = cache.get("Customer/Generation").await.unwrap().unwrap();
        assert_eq!(raw, b"3".to_vec());

        cache.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_clear_is_scoped_to_namespace() {
        let Some(cache) = get_test_cache().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };
        let Some(other) = get_test_cache().await else {
            return;
        };

        cache.set("a", b"1", &CachePolicy::NoExpiration).await.unwrap();
        other.set("a", b"2", &CachePolicy::NoExpiration).await.unwrap();

        cache.clear().await.unwrap();

        assert!(cache.get("a").await.unwrap().is_none());
        assert_eq!(other.get("a").await.unwrap(), Some(b"2".to_vec()));

        other.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_binary_data() {
        let Some(cache) = get_test_cache().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let value: Vec<u8> = (0..=255).collect();
        cache
            .set("binary", &value, &CachePolicy::NoExpiration)
            .await
            .unwrap();

        assert_eq!(cache.get("binary").await.unwrap(), Some(value));

        cache.clear().await.unwrap();
    }
}
