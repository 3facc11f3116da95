//! Generational read-through query cache for repositories.
//!
//! - [`cache`]: cache backends (in-memory LRU, Redis behind the `redis` feature)
//! - [`storage`]: the caching repository decorator and an in-memory repository
//! - [`config`]: environment-driven configuration

pub mod cache;
pub mod config;
pub mod storage;
