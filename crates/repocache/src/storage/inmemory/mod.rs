//! In-memory storage backend for testing.
//!
//! This module provides an in-memory implementation of the repository trait
//! that stores committed rows in a `BTreeMap` wrapped in `Arc<RwLock<_>>`.
//! Writes are staged until `commit`, mirroring the unit of work of a real
//! database backend. Data is not persisted.
//!
//! # Example
//!
//! ```rust,ignore
//! use repocache::storage::inmemory::InMemoryRepository;
//!
//! let repo = InMemoryRepository::<Customer>::new(["id"]);
//! repo.add(&customer).await?;
//! repo.commit().await?;
//! ```

mod repository;

pub use repository::{CommandHandler, InMemoryRepository};
