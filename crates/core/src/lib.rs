//! Core types for the repocache generational query cache.
//!
//! This crate holds the pure parts of the system: the cache backend and
//! repository contracts, the predicate/query values, and the functions that
//! turn them into deterministic cache keys. Backends and the caching
//! decorator live in the `repocache` crate.

pub mod cache;
pub mod query;
pub mod storage;
