//! Cache backend implementations.
//!
//! This module provides concrete implementations of the
//! [`CacheBackend`](repocache_core::cache::CacheBackend) trait defined in
//! `repocache_core::cache`.
//!
//! # Feature Flags
//!
//! - always available: [`MemoryCache`], in-memory cache with LRU eviction
//! - `redis`: `RedisCache`, a distributed cache using the redis crate

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis_impl;

pub use memory::MemoryCache;

#[cfg(feature = "redis")]
pub use redis_impl::RedisCache;
