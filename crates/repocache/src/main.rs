mod mock_data;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use repocache::cache::MemoryCache;
use repocache::config::Config;
use repocache::storage::{CachingRepository, InMemoryRepository};
use repocache_core::cache::{query_key, CacheBackend};
use repocache_core::query::{Command, Expr, Query};
use repocache_core::storage::{Entity, EntityId, Repository};

use crate::mock_data::{customer_repository, generate_mock_customers, Customer};

type CachedCustomers = CachingRepository<Customer, InMemoryRepository<Customer>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// In-process LRU cache
    Memory,
    /// Redis server (requires the `redis` feature)
    Redis,
}

/// repocache - Generational read-through query cache for repositories
#[derive(Parser, Debug)]
#[command(name = "repocache")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Cache backend to run the walkthrough against
    #[arg(long, short, value_enum, default_value_t = Backend::Memory, env = "CACHE_BACKEND")]
    backend: Backend,

    /// Cache TTL in seconds, 0 disables expiration (overrides CACHE_TTL_SECONDS)
    #[arg(long)]
    ttl: Option<u64>,

    /// Maximum in-memory cache entries (overrides CACHE_MAX_ENTRIES)
    #[arg(long)]
    max_entries: Option<usize>,

    /// Treat cache backend failures as misses (overrides CACHE_FAIL_OPEN)
    #[arg(long)]
    fail_open: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repocache=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env();
    if let Some(ttl) = cli.ttl {
        config.cache_ttl_seconds = ttl;
    }
    if let Some(max_entries) = cli.max_entries {
        config.cache_max_entries = max_entries;
    }
    config.cache_fail_open |= cli.fail_open;

    tracing::info!(backend = ?cli.backend, ?config, "Starting walkthrough");

    let cache = connect_backend(cli.backend, &config).await?;

    // Seed the store directly so the cache starts cold
    let repository = customer_repository();
    for customer in generate_mock_customers() {
        repository.add(&customer).await?;
    }
    repository.commit().await?;

    let customers: CachedCustomers = CachingRepository::builder()
        .repository(Arc::new(repository))
        .cache(cache)
        .options(config.cache_options())
        .build()?;

    run_walkthrough(&customers).await?;

    customers.clear().await?;
    tracing::info!("Walkthrough finished");
    Ok(())
}

async fn connect_backend(backend: Backend, config: &Config) -> Result<Arc<dyn CacheBackend>> {
    match backend {
        Backend::Memory => Ok(Arc::new(MemoryCache::new(config.cache_max_entries))),
        #[cfg(feature = "redis")]
        Backend::Redis => {
            let cache =
                repocache::cache::RedisCache::new(&config.redis_url, config.cache_namespace.clone())
                    .await
                    .with_context(|| format!("Failed to connect to {}", config.redis_url))?;
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        Backend::Redis => {
            anyhow::bail!("The redis backend requires building with `--features redis`")
        }
    }
}

async fn run_walkthrough(customers: &CachedCustomers) -> Result<()> {
    let entity_type = Customer::entity_type();
    let active = Query::filter(Expr::field("active").equals(true)).order_by("name");

    // 1. Cold query, then the same query served from the cache
    let generation = customers.generations().current(entity_type).await?;
    let key = query_key(entity_type, &active, generation)?;
    let found = customers.find_all(&active).await?;
    tracing::info!(generation, %key, count = found.len(), "Active customers loaded");

    let again = customers.find_all(&active).await?;
    tracing::info!(count = again.len(), "Active customers served again");

    // 2. Point reads are cached independently of generations
    let ada = customers.get_by_id(&EntityId::from(1)).await?;
    tracing::info!(customer = ?ada, "Point read");

    let ids = [EntityId::from(4), EntityId::from(99), EntityId::from(1)];
    let batch = customers.get_by_ids(&ids).await?;
    tracing::info!(
        requested = ids.len(),
        found = batch.len(),
        "Batch read kept caller order"
    );

    // 3. A staged write leaves the cache alone until commit
    let newton = Customer::new(42, "Isaac Newton", "London", true);
    customers.add(&newton).await?;
    tracing::info!(
        pending = customers.pending_invalidations().await,
        generation = customers.generations().current(entity_type).await?,
        "Customer staged"
    );

    customers.commit().await.context("Commit failed")?;
    let generation = customers.generations().current(entity_type).await?;
    tracing::info!(
        generation,
        pending = customers.pending_invalidations().await,
        "Committed; older query keys are now unreachable"
    );

    // 4. The same query now misses under the new generation
    let key = query_key(entity_type, &active, generation)?;
    let found = customers.find_all(&active).await?;
    tracing::info!(generation, %key, count = found.len(), "Active customers reloaded");

    // 5. Raw commands and counts share the generation scheme
    let in_london = customers
        .execute(&Command::new("in_city").param("city", "London"))
        .await?;
    let total = customers.count(None).await?;
    tracing::info!(in_london = in_london.len(), total, "Command and count");

    Ok(())
}
