//! Persistent storage for an in-memory query cache.
//!
//! This crate provides:
//! - Query entries, fingerprints and the state reducer
//! - An in-memory cache and a decorator that mirrors its lifecycle to storage
//! - A SQLite persistence adapter with blocking and async drivers
//! - Unified error types and layered configuration
//!
//! ```no_run
//! use qpersist_core::{Database, PersistOptions, QueryCache, QueryKey, create_persistent_cache};
//!
//! # fn main() -> Result<(), qpersist_core::Error> {
//! let db = Database::open("./query-cache.sqlite")?;
//! let cache = create_persistent_cache(&db, PersistOptions::default())?;
//!
//! // Hydrated from disk if a previous run stored it.
//! let todos = cache.build(QueryKey::from("/todos"));
//! println!("{:?}", todos.state().data);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod persist;
pub mod query;
pub mod storage;

pub use cache::{CacheEvent, MemoryQueryCache, PersistentQueryCache, QueryCache};
pub use config::PersistConfig;
pub use error::{Error, ErrorSink};
pub use persist::{
    PersistOptions, QueryCachePersister, SqlPersister, create_async_persistent_cache, create_persistent_cache,
};
pub use query::{Action, Query, QueryKey, QueryState};
pub use storage::{AsyncDatabase, AsyncSqliteDriver, Database, SqliteDriver, StorageDriver, Table};
