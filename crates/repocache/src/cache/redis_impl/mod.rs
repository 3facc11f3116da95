//! Redis cache backend implementation.
//!
//! Provides a distributed cache using Redis for multi-instance deployments.
//! Generation counters live in Redis too, so every instance pointing at the
//! same server shares them.

mod cache;
mod error;

pub use cache::RedisCache;
