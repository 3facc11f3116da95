//! Generational caching repository decorator.
//!
//! [`CachingRepository`] wraps any repository with a read-through cache:
//!
//! - **Point reads** (`get_by_id`, `get_by_ids`): cached per entity under a
//!   stable key; misses are written through.
//! - **Query reads** (`find_all`, `execute`, `count`): cached under keys that
//!   embed the entity type's current generation.
//! - **Writes**: delegated immediately; their cache effects are queued in a
//!   [`DelayedInvalidationQueue`] and applied only after the underlying
//!   commit succeeds. Applying a write bumps the generation through the
//!   [`GenerationStore`], which strands every older query key at once.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! let repo = Arc::new(InMemoryRepository::<Customer>::new(["id"]));
//! let cached = CachingRepository::builder()
//!     .repository(repo)
//!     .cache(Arc::new(MemoryCache::new(10_000)))
//!     .build()?;
//! ```

mod generation;
mod queue;
mod repository;

pub use generation::GenerationStore;
pub use queue::{DelayedInvalidationQueue, PendingInvalidation};
pub use repository::{CacheOptions, CachingRepository, CachingRepositoryBuilder};
