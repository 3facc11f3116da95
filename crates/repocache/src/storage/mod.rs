//! Repository implementations.
//!
//! - [`inmemory`]: a reference repository with a staged unit of work, used by
//!   the CLI walkthrough and by tests.
//! - [`cached`]: the generational read-through caching decorator that wraps
//!   any [`Repository`](repocache_core::storage::Repository).

pub mod cached;
pub mod inmemory;

pub use cached::{
    CacheOptions, CachingRepository, CachingRepositoryBuilder, DelayedInvalidationQueue,
    GenerationStore, PendingInvalidation,
};
pub use inmemory::InMemoryRepository;
