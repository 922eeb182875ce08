//! Persistence adapter: mirrors cache lifecycle events into storage.
//!
//! [`SqlPersister`] reacts to the three lifecycle hooks of
//! [`QueryCachePersister`]:
//!
//! - `add`: hydrate the entry from its stored row, then write the resulting
//!   state back. The write happens even when nothing was hydrated, so an
//!   entry always has a row once it has been added.
//! - `updated`: write the current state.
//! - `removed`: delete the row.
//!
//! No hook fails. Every error is reported to the [`ErrorSink`] and the entry
//! carries on with whatever in-memory state it has.

use crate::cache::{MemoryQueryCache, PersistentQueryCache};
use crate::config::PersistConfig;
use crate::error::{Error, ErrorSink};
use crate::query::{Query, QueryState};
use crate::storage::{AsyncDatabase, AsyncSqliteDriver, DEFAULT_TABLE, Database, SqliteDriver, StorageDriver, Table};

/// Callbacks invoked by a persistent cache at its lifecycle points.
pub trait QueryCachePersister: Send + Sync {
    /// A new entry is about to be tracked.
    fn add(&self, query: &Query);

    /// The entry's state changed.
    fn updated(&self, query: &Query);

    /// The entry is no longer tracked.
    fn removed(&self, query: &Query);
}

/// Options for [`create_persistent_cache`] and [`create_async_persistent_cache`].
#[derive(Debug, Clone)]
pub struct PersistOptions {
    /// Table holding the rows. Defaults to `query_cache`.
    pub table_name: String,
    /// Receives every recoverable error. Defaults to ignoring them.
    pub on_error: ErrorSink,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self { table_name: DEFAULT_TABLE.to_string(), on_error: ErrorSink::ignore() }
    }
}

impl PersistOptions {
    pub fn from_config(config: &PersistConfig) -> Self {
        Self { table_name: config.table_name.clone(), ..Default::default() }
    }

    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error = ErrorSink::new(callback);
        self
    }
}

/// Persister storing each entry's state as a JSON blob through a [`StorageDriver`].
#[derive(Debug)]
pub struct SqlPersister<D> {
    driver: D,
    on_error: ErrorSink,
}

impl<D: StorageDriver> SqlPersister<D> {
    pub fn new(driver: D, on_error: ErrorSink) -> Self {
        Self { driver, on_error }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn hydrate(&self, query: &Query) {
        let blob = match self.driver.select(query.hash()) {
            Ok(Some(blob)) => blob,
            Ok(None) => return,
            Err(e) => return self.on_error.report(e),
        };

        match serde_json::from_str::<QueryState>(&blob) {
            Ok(state) => {
                tracing::debug!(query_hash = query.hash(), "hydrated query state");
                query.replace_state(state);
            }
            Err(source) => self.on_error.report(Error::Parse { hash: query.hash().to_string(), source }),
        }
    }

    fn write(&self, query: &Query) {
        let blob = match serde_json::to_string(&query.state()) {
            Ok(blob) => blob,
            Err(source) => {
                return self.on_error.report(Error::Serialize { hash: query.hash().to_string(), source });
            }
        };

        match self.driver.upsert(query.hash(), &blob) {
            Ok(()) => tracing::debug!(query_hash = query.hash(), bytes = blob.len(), "persisted query state"),
            Err(e) => self.on_error.report(e),
        }
    }
}

impl<D: StorageDriver> QueryCachePersister for SqlPersister<D> {
    fn add(&self, query: &Query) {
        self.hydrate(query);
        self.write(query);
    }

    fn updated(&self, query: &Query) {
        self.write(query);
    }

    fn removed(&self, query: &Query) {
        match self.driver.delete(query.hash()) {
            Ok(()) => tracing::debug!(query_hash = query.hash(), "deleted persisted query state"),
            Err(e) => self.on_error.report(e),
        }
    }
}

/// Persistent cache over a blocking SQLite connection.
pub type SqlitePersistentCache = PersistentQueryCache<MemoryQueryCache, SqlPersister<SqliteDriver>>;

/// Persistent cache over a tokio-rusqlite connection.
pub type AsyncSqlitePersistentCache = PersistentQueryCache<MemoryQueryCache, SqlPersister<AsyncSqliteDriver>>;

/// Build a persistent cache backed by `db`.
///
/// Creates the table if needed. The returned cache is used in place of a
/// plain [`MemoryQueryCache`].
///
/// # Errors
///
/// Returns an error if the table name is invalid or the table cannot be
/// created.
pub fn create_persistent_cache(db: &Database, options: PersistOptions) -> Result<SqlitePersistentCache, Error> {
    let driver = SqliteDriver::new(db.clone(), Table::new(&options.table_name)?)?;
    Ok(PersistentQueryCache::new(MemoryQueryCache::new(), SqlPersister::new(driver, options.on_error)))
}

/// Build a persistent cache backed by an async connection.
///
/// Existing rows are loaded before this returns, so entries hydrate
/// synchronously like with [`create_persistent_cache`]. Writes are applied
/// in the background; `cache.persister().driver().flush().await` waits for
/// them. Caches created on clones of the same `db` for the same table share
/// one mirror and one writer.
///
/// # Errors
///
/// Returns an error if the table name is invalid or the table cannot be
/// created or read.
pub async fn create_async_persistent_cache(
    db: &AsyncDatabase, options: PersistOptions,
) -> Result<AsyncSqlitePersistentCache, Error> {
    let table = Table::new(&options.table_name)?;
    let driver = AsyncSqliteDriver::open(db, table, options.on_error.clone()).await?;
    Ok(PersistentQueryCache::new(MemoryQueryCache::new(), SqlPersister::new(driver, options.on_error)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryCache;
    use crate::query::{Action, QueryKey, QueryStatus};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_sink() -> (ErrorSink, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sink = ErrorSink::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (sink, calls)
    }

    fn persister(db: &Database, sink: ErrorSink) -> SqlPersister<SqliteDriver> {
        SqlPersister::new(SqliteDriver::new(db.clone(), Table::default()).unwrap(), sink)
    }

    fn entry(hash: &str) -> Query {
        Query::with_hash(QueryKey::from("/test"), hash)
    }

    fn stored(persister: &SqlPersister<SqliteDriver>, hash: &str) -> Option<Value> {
        persister
            .driver()
            .select(hash)
            .unwrap()
            .map(|blob| serde_json::from_str(&blob).unwrap())
    }

    #[test]
    fn test_add_to_empty_table_writes_row() {
        let db = Database::open_in_memory().unwrap();
        let (sink, errors) = counting_sink();
        let persister = persister(&db, sink);

        persister.add(&entry("h1"));

        let row = stored(&persister, "h1").unwrap();
        assert_eq!(row["data"], Value::Null);
        assert_eq!(persister.driver().count().unwrap(), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_updated_replaces_row() {
        let db = Database::open_in_memory().unwrap();
        let persister = persister(&db, ErrorSink::ignore());
        persister.driver().upsert("h1", r#"{"data":"old"}"#).unwrap();

        let query = entry("h1");
        query.apply(Action::SetState(QueryState { data: Some(json!("new")), ..Default::default() }));
        persister.updated(&query);

        assert_eq!(stored(&persister, "h1").unwrap()["data"], json!("new"));
        assert_eq!(persister.driver().count().unwrap(), 1);
    }

    #[test]
    fn test_add_with_corrupt_row_keeps_default_and_reports_once() {
        let db = Database::open_in_memory().unwrap();
        let (sink, errors) = counting_sink();
        let persister = persister(&db, sink);
        persister.driver().upsert("h1", "not valid json").unwrap();

        let query = entry("h1");
        persister.add(&query);

        assert_eq!(query.state(), QueryState::default());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(stored(&persister, "h1").unwrap()["data"], Value::Null);
    }

    #[test]
    fn test_removed_deletes_row() {
        let db = Database::open_in_memory().unwrap();
        let persister = persister(&db, ErrorSink::ignore());
        persister.driver().upsert("h1", r#"{"data":"x"}"#).unwrap();

        persister.removed(&entry("h1"));
        assert!(persister.driver().select("h1").unwrap().is_none());

        persister.removed(&entry("h1"));
        assert!(persister.driver().select("h1").unwrap().is_none());
    }

    #[test]
    fn test_round_trip_through_fresh_persister() {
        let db = Database::open_in_memory().unwrap();
        let query = entry("h1");
        query.apply(Action::Success { data: json!({"items": [1, 2, 3]}), updated_at: Some(1_700_000_000_000) });
        persister(&db, ErrorSink::ignore()).updated(&query);

        let restored = entry("h1");
        persister(&db, ErrorSink::ignore()).add(&restored);

        assert_eq!(restored.state(), query.state());
        assert_eq!(restored.state().status, QueryStatus::Success);
    }

    #[test]
    fn test_repeated_update_keeps_single_row() {
        let db = Database::open_in_memory().unwrap();
        let persister = persister(&db, ErrorSink::ignore());
        let query = entry("h1");
        query.apply(Action::Success { data: json!("same"), updated_at: Some(5) });

        persister.updated(&query);
        persister.updated(&query);

        assert_eq!(persister.driver().count().unwrap(), 1);
        assert_eq!(stored(&persister, "h1").unwrap()["data"], json!("same"));
    }

    #[test]
    fn test_delete_then_add_starts_fresh() {
        let db = Database::open_in_memory().unwrap();
        let (sink, errors) = counting_sink();
        let persister = persister(&db, sink);
        let query = entry("h1");
        query.apply(Action::Success { data: json!("cached"), updated_at: Some(5) });
        persister.updated(&query);

        persister.removed(&query);
        assert!(persister.driver().select("h1").unwrap().is_none());

        let readded = entry("h1");
        persister.add(&readded);
        assert_eq!(readded.state(), QueryState::default());
        assert_eq!(stored(&persister, "h1").unwrap()["data"], Value::Null);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sequential_updates_leave_latest() {
        let db = Database::open_in_memory().unwrap();
        let persister = persister(&db, ErrorSink::ignore());
        let query = entry("h1");

        query.apply(Action::Success { data: json!("s1"), updated_at: Some(1) });
        persister.updated(&query);
        query.apply(Action::Success { data: json!("s2"), updated_at: Some(2) });
        persister.updated(&query);

        assert_eq!(stored(&persister, "h1").unwrap()["data"], json!("s2"));
    }

    #[test]
    fn test_unexpected_row_shape_is_reported() {
        let db = Database::open_in_memory().unwrap();
        let (sink, errors) = counting_sink();
        let persister = persister(&db, sink);
        db.with(|conn| conn.execute("INSERT INTO query_cache (query_hash, query_state) VALUES ('h1', NULL)", []))
            .unwrap();

        let query = entry("h1");
        persister.add(&query);

        assert_eq!(query.state(), QueryState::default());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(stored(&persister, "h1").is_some());
    }

    #[test]
    fn test_write_failure_is_reported() {
        let db = Database::open_in_memory().unwrap();
        let (sink, errors) = counting_sink();
        let persister = persister(&db, sink);
        db.with(|conn| conn.execute_batch("DROP TABLE query_cache")).unwrap();

        let query = entry("h1");
        persister.add(&query);
        persister.updated(&query);
        persister.removed(&query);

        // select, upsert, upsert, delete
        assert_eq!(errors.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        let db = Database::open_in_memory().unwrap();
        let result = create_persistent_cache(&db, PersistOptions::default().table_name("bad name"));
        assert!(matches!(result, Err(Error::InvalidTableName(_))));
    }

    #[test]
    fn test_warm_start_serves_persisted_state() {
        let db = Database::open_in_memory().unwrap();
        let key = QueryKey::from("/test");

        let cache = create_persistent_cache(&db, PersistOptions::default()).unwrap();
        let first = cache.set_query_data(key.clone(), json!("test 2"));
        let before = first.state();

        let restarted = create_persistent_cache(&db, PersistOptions::default()).unwrap();
        let hydrated = restarted.build(key.clone());
        assert_eq!(hydrated.state(), before);
        assert_eq!(restarted.persister().driver().select(hydrated.hash()).unwrap(), Some(serde_json::to_string(&before).unwrap()));

        restarted.remove(&hydrated);
        assert_eq!(restarted.persister().driver().count().unwrap(), 0);
    }

    #[test]
    fn test_custom_table_and_error_callback() {
        let db = Database::open_in_memory().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let options = PersistOptions::default().table_name("my_cache").on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let cache = create_persistent_cache(&db, options).unwrap();
        assert_eq!(cache.persister().driver().table().name(), "my_cache");

        cache.persister().driver().upsert("h1", "{").unwrap();
        cache.build_with_hash(QueryKey::from("/test"), "h1".to_string());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_options_from_config() {
        let config = PersistConfig { table_name: "cfg_cache".into(), ..Default::default() };
        let options = PersistOptions::from_config(&config);
        assert_eq!(options.table_name, "cfg_cache");

        let db = Database::open_in_memory().unwrap();
        let cache = create_persistent_cache(&db, options).unwrap();
        assert_eq!(cache.persister().driver().table().name(), "cfg_cache");
    }

    #[tokio::test]
    async fn test_async_cache_round_trip() {
        let path = std::env::temp_dir().join(format!("qpersist-round-trip-{}.sqlite", std::process::id()));
        let config = PersistConfig { db_path: path.clone(), table_name: "async_cache".into(), ..Default::default() };
        let key = QueryKey::from("/test");

        let db = AsyncDatabase::open_with_config(&config).await.unwrap();
        let cache = create_async_persistent_cache(&db, PersistOptions::from_config(&config)).await.unwrap();
        let query = cache.set_query_data(key.clone(), json!("test"));
        for i in 0..10 {
            cache.dispatch(&query, Action::Success { data: json!(i), updated_at: None });
        }
        cache.persister().driver().flush().await.unwrap();

        // A new connection preloads from the file rather than joining the open mirror.
        let reopened = AsyncDatabase::open_with_config(&config).await.unwrap();
        let restarted = create_async_persistent_cache(&reopened, PersistOptions::from_config(&config)).await.unwrap();
        let hydrated = restarted.build(key);
        assert_eq!(hydrated.state().data, Some(json!(9)));

        restarted.remove(&hydrated);
        restarted.persister().driver().flush().await.unwrap();
        let again = AsyncDatabase::open_with_config(&config).await.unwrap();
        let fresh = create_async_persistent_cache(&again, PersistOptions::from_config(&config)).await.unwrap();
        assert!(fresh.persister().driver().select(hydrated.hash()).unwrap().is_none());

        drop((cache, restarted, fresh, db, reopened, again));
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    #[tokio::test]
    async fn test_async_caches_on_one_database_agree() {
        let db = AsyncDatabase::open_in_memory().await.unwrap();
        let key = QueryKey::from("/test");

        let first = create_async_persistent_cache(&db, PersistOptions::default()).await.unwrap();
        let second = create_async_persistent_cache(&db, PersistOptions::default()).await.unwrap();

        first.set_query_data(key.clone(), json!("new"));
        let hydrated = second.build(key);
        assert_eq!(hydrated.state().data, Some(json!("new")));
    }
}
