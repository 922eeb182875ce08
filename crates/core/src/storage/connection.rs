//! Database connection management with pragma configuration.
//!
//! Connections are opened explicitly by the embedding application and passed
//! to the drivers. Both handles are cheap to clone and share one underlying
//! SQLite connection.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_rusqlite::rusqlite;

use super::async_sqlite::SharedTable;
use crate::Error;
use crate::config::PersistConfig;

const WAL_PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;";

const DEFAULT_PRAGMAS: &str = "PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;";

fn configure(conn: &rusqlite::Connection, wal: bool, busy_timeout: Duration) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(if wal { WAL_PRAGMAS } else { DEFAULT_PRAGMAS })
}

/// Blocking database handle.
///
/// Wraps a rusqlite Connection behind a mutex; statements run on the
/// caller's thread. This is the handle that supports synchronous hydration.
#[derive(Clone, Debug)]
pub struct Database {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl Database {
    /// Open a database at the specified path with WAL enabled.
    ///
    /// Creates the file if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_with(path, true, Duration::from_millis(5_000))
    }

    /// Open the database described by `config`.
    pub fn open_with_config(config: &PersistConfig) -> Result<Self, Error> {
        Self::open_with(&config.db_path, config.wal, config.busy_timeout())
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = rusqlite::Connection::open_in_memory()?;
        configure(&conn, false, Duration::from_millis(5_000))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn open_with(path: impl AsRef<Path>, wal: bool, busy_timeout: Duration) -> Result<Self, Error> {
        let conn = rusqlite::Connection::open(path.as_ref())?;
        configure(&conn, wal, busy_timeout)?;
        tracing::info!(path = %path.as_ref().display(), wal, "opened query cache database");
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with<R>(&self, f: impl FnOnce(&rusqlite::Connection) -> Result<R, rusqlite::Error>) -> Result<R, Error> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn).map_err(Error::from)
    }
}

/// Async database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Clones also share the mirrors of tables opened
/// by async drivers.
#[derive(Clone, Debug)]
pub struct AsyncDatabase {
    pub(crate) conn: tokio_rusqlite::Connection,
    pub(crate) tables: Arc<tokio::sync::Mutex<HashMap<String, Arc<SharedTable>>>>,
}

impl AsyncDatabase {
    /// Open a database at the specified path with WAL enabled.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = tokio_rusqlite::Connection::open(path.as_ref())
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::configured(conn, true, Duration::from_millis(5_000)).await
    }

    /// Open the database described by `config`.
    pub async fn open_with_config(config: &PersistConfig) -> Result<Self, Error> {
        let conn = tokio_rusqlite::Connection::open(&config.db_path)
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::configured(conn, config.wal, config.busy_timeout()).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::configured(conn, false, Duration::from_millis(5_000)).await
    }

    async fn configured(conn: tokio_rusqlite::Connection, wal: bool, busy_timeout: Duration) -> Result<Self, Error> {
        conn.call(move |conn| configure(conn, wal, busy_timeout))
            .await
            .map_err(Error::Database)?;
        Ok(Self { conn, tables: Arc::default() })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }
}
