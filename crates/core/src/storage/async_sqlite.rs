//! Async SQLite driver built on tokio-rusqlite.
//!
//! tokio-rusqlite only offers async calls, which cannot answer a hydration
//! read before the hook returns. The driver therefore loads the whole table
//! into a mirror when it is opened and serves `select` from there. Writes
//! update the mirror immediately and are queued for a single writer task,
//! which applies them in the order they were queued.
//!
//! The mirror and the writer belong to the table, not to the driver: every
//! driver opened for the same table on clones of one `AsyncDatabase` shares
//! them. Writes made to the table by other connections after it was
//! preloaded are not seen.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::AsyncDatabase;
use super::schema::Table;
use super::{StorageDriver, StoredCell};
use crate::error::{Error, ErrorSink};

#[derive(Debug)]
enum Write {
    Upsert { hash: String, state: String },
    Delete { hash: String },
    Flush(oneshot::Sender<()>),
}

/// A queued write and the sink of the driver that queued it.
#[derive(Debug)]
struct Queued {
    write: Write,
    on_error: ErrorSink,
}

/// Mirror and write queue of one table.
#[derive(Debug)]
pub(crate) struct SharedTable {
    mirror: Mutex<HashMap<String, StoredCell>>,
    writes: mpsc::UnboundedSender<Queued>,
}

/// Driver with synchronous reads from a preloaded mirror and queued writes.
#[derive(Debug)]
pub struct AsyncSqliteDriver {
    table: Table,
    shared: Arc<SharedTable>,
    on_error: ErrorSink,
}

impl AsyncSqliteDriver {
    /// Create `table` if needed, preload its rows and start the writer.
    ///
    /// If a driver for `table` was already opened on this database, the new
    /// driver joins its mirror and writer instead. Failures of writes queued
    /// through this driver are reported to `on_error`.
    pub async fn open(db: &AsyncDatabase, table: Table, on_error: ErrorSink) -> Result<Self, Error> {
        let mut tables = db.tables.lock().await;
        if let Some(shared) = tables.get(table.name()) {
            tracing::debug!(table = table.name(), "joined open query cache table");
            return Ok(Self { table, shared: Arc::clone(shared), on_error });
        }

        let create = table.create_sql();
        let entries = table.entries_sql();
        let rows = db
            .conn
            .call(move |conn| -> Result<Vec<(String, StoredCell)>, rusqlite::Error> {
                conn.execute_batch(&create)?;
                let mut stmt = conn.prepare(&entries)?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, StoredCell::read(row.get_ref(1)?))))?;
                rows.collect()
            })
            .await?;
        tracing::info!(table = table.name(), rows = rows.len(), "query cache table preloaded");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(db.conn.clone(), table.clone(), rx));

        let shared = Arc::new(SharedTable { mirror: Mutex::new(rows.into_iter().collect()), writes: tx });
        tables.insert(table.name().to_string(), Arc::clone(&shared));
        Ok(Self { table, shared, on_error })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Wait until every write queued before this call has been applied.
    pub async fn flush(&self) -> Result<(), Error> {
        let (done, wait) = oneshot::channel();
        self.queue(Write::Flush(done))?;
        wait.await.map_err(|_| Error::WriterClosed)
    }

    fn queue(&self, write: Write) -> Result<(), Error> {
        self.shared
            .writes
            .send(Queued { write, on_error: self.on_error.clone() })
            .map_err(|_| Error::WriterClosed)
    }

    /// Update the mirror and queue `write` under one lock, so queue order
    /// always matches mirror order.
    fn apply(&self, hash: &str, cell: Option<StoredCell>, write: Write) -> Result<(), Error> {
        let mut mirror = self.shared.mirror.lock().unwrap_or_else(PoisonError::into_inner);
        match cell {
            Some(cell) => mirror.insert(hash.to_string(), cell),
            None => mirror.remove(hash),
        };
        self.queue(write)
    }
}

impl StorageDriver for AsyncSqliteDriver {
    fn select(&self, hash: &str) -> Result<Option<String>, Error> {
        let mirror = self.shared.mirror.lock().unwrap_or_else(PoisonError::into_inner);
        mirror.get(hash).cloned().map(|cell| cell.into_text(hash)).transpose()
    }

    fn upsert(&self, hash: &str, state: &str) -> Result<(), Error> {
        self.apply(
            hash,
            Some(StoredCell::Text(state.to_string())),
            Write::Upsert { hash: hash.to_string(), state: state.to_string() },
        )
    }

    fn delete(&self, hash: &str) -> Result<(), Error> {
        self.apply(hash, None, Write::Delete { hash: hash.to_string() })
    }
}

async fn run_writer(conn: tokio_rusqlite::Connection, table: Table, mut writes: mpsc::UnboundedReceiver<Queued>) {
    let upsert_sql = table.upsert_sql();
    let delete_sql = table.delete_sql();

    while let Some(Queued { write, on_error }) = writes.recv().await {
        let result = match write {
            Write::Upsert { hash, state } => {
                let sql = upsert_sql.clone();
                conn.call(move |conn| -> Result<(), rusqlite::Error> {
                    conn.prepare_cached(&sql)?.execute(params![hash, state])?;
                    Ok(())
                })
                .await
            }
            Write::Delete { hash } => {
                let sql = delete_sql.clone();
                conn.call(move |conn| -> Result<(), rusqlite::Error> {
                    conn.prepare_cached(&sql)?.execute(params![hash])?;
                    Ok(())
                })
                .await
            }
            Write::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        if let Err(e) = result {
            on_error.report(Error::from(e));
        }
    }

    tracing::debug!(table = table.name(), "query cache writer stopped");
}
