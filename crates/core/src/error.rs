//! Unified error types for qpersist.
//!
//! Lifecycle hooks never return these to the cache layer. They are handed to
//! an [`ErrorSink`] instead, which logs them and forwards them to the
//! embedding application's callback.

use std::fmt;
use std::sync::Arc;

use tokio_rusqlite::rusqlite;

/// Unified error types for query cache persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// A stored state blob could not be decoded.
    #[error("HYDRATE_FAILED: query {hash}: {source}")]
    Parse { hash: String, source: serde_json::Error },

    /// A stored row held something other than text in its state column.
    #[error("HYDRATE_FAILED: query {hash}: unexpected value type {found}")]
    UnexpectedValue { hash: String, found: &'static str },

    /// In-memory state could not be encoded.
    #[error("PERSIST_FAILED: query {hash}: {source}")]
    Serialize { hash: String, source: serde_json::Error },

    /// Table name is not a plain SQL identifier.
    #[error("INVALID_TABLE_NAME: {0:?}")]
    InvalidTableName(String),

    /// The background writer of an async driver has shut down.
    #[error("PERSIST_FAILED: writer closed")]
    WriterClosed,
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

/// Callback signature for recoverable persistence errors.
pub type ErrorCallback = dyn Fn(&Error) + Send + Sync;

/// Side channel for errors raised inside lifecycle hooks.
///
/// Every report is logged at `warn` level. When a callback is installed it is
/// invoked once per report; without one the error is otherwise ignored.
#[derive(Clone, Default)]
pub struct ErrorSink {
    callback: Option<Arc<ErrorCallback>>,
}

impl ErrorSink {
    /// Sink forwarding every report to `callback`.
    pub fn new(callback: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        Self { callback: Some(Arc::new(callback)) }
    }

    /// Sink that only logs.
    pub fn ignore() -> Self {
        Self::default()
    }

    pub fn report(&self, err: Error) {
        tracing::warn!(error = %err, "query cache persistence error");
        if let Some(callback) = &self.callback {
            callback(&err);
        }
    }
}

impl fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorSink").field("callback", &self.callback.is_some()).finish()
    }
}
