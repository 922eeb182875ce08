//! SQLite storage for persisted query state.
//!
//! The persistence adapter only sees the three-operation [`StorageDriver`]
//! contract. Two backends implement it:
//!
//! - [`SqliteDriver`]: blocking rusqlite; reads and writes run on the hook's
//!   call path.
//! - [`AsyncSqliteDriver`]: tokio-rusqlite; reads are served from a mirror
//!   preloaded at open time, writes are queued and applied in order by a
//!   single writer task.
//!
//! Both hydrate synchronously.

pub mod async_sqlite;
pub mod connection;
pub mod schema;
pub mod sqlite;

use tokio_rusqlite::rusqlite::types::ValueRef;

use crate::Error;

pub use async_sqlite::AsyncSqliteDriver;
pub use connection::{AsyncDatabase, Database};
pub use schema::{DEFAULT_TABLE, Table};
pub use sqlite::SqliteDriver;

/// Uniform access to the persisted table.
pub trait StorageDriver: Send + Sync {
    /// Stored state blob for `hash`, or `None` when no row exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the row holds a non-text value.
    fn select(&self, hash: &str) -> Result<Option<String>, Error>;

    /// Insert or replace the row for `hash`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or cannot be queued.
    fn upsert(&self, hash: &str, state: &str) -> Result<(), Error>;

    /// Delete the row for `hash`. Absent rows are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails or cannot be queued.
    fn delete(&self, hash: &str) -> Result<(), Error>;
}

/// Raw content of a `query_state` cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StoredCell {
    Text(String),
    Unexpected(&'static str),
}

impl StoredCell {
    pub(crate) fn read(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => StoredCell::Text(text.to_string()),
                Err(_) => StoredCell::Unexpected("invalid utf-8 text"),
            },
            ValueRef::Null => StoredCell::Unexpected("null"),
            ValueRef::Integer(_) => StoredCell::Unexpected("integer"),
            ValueRef::Real(_) => StoredCell::Unexpected("real"),
            ValueRef::Blob(_) => StoredCell::Unexpected("blob"),
        }
    }

    pub(crate) fn into_text(self, hash: &str) -> Result<String, Error> {
        match self {
            StoredCell::Text(text) => Ok(text),
            StoredCell::Unexpected(found) => Err(Error::UnexpectedValue { hash: hash.to_string(), found }),
        }
    }
}
