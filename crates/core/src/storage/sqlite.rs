//! Blocking SQLite driver.

use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::OptionalExtension;

use super::connection::Database;
use super::schema::Table;
use super::{StorageDriver, StoredCell};
use crate::Error;

/// Driver running every statement synchronously on the shared [`Database`].
#[derive(Clone, Debug)]
pub struct SqliteDriver {
    db: Database,
    table: Table,
    select_sql: String,
    upsert_sql: String,
    delete_sql: String,
}

impl SqliteDriver {
    /// Bind to `table`, creating it if it does not exist.
    pub fn new(db: Database, table: Table) -> Result<Self, Error> {
        let create = table.create_sql();
        db.with(|conn| conn.execute_batch(&create))?;
        tracing::info!(table = table.name(), "query cache table ready");

        Ok(Self {
            select_sql: table.select_sql(),
            upsert_sql: table.upsert_sql(),
            delete_sql: table.delete_sql(),
            db,
            table,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Every row as `(hash, state)`, ordered by hash.
    ///
    /// Rows whose state is not text are returned with `None`.
    pub fn entries(&self) -> Result<Vec<(String, Option<String>)>, Error> {
        let sql = self.table.entries_sql();
        self.db.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                let hash: String = row.get(0)?;
                let state = match StoredCell::read(row.get_ref(1)?) {
                    StoredCell::Text(text) => Some(text),
                    StoredCell::Unexpected(_) => None,
                };
                Ok((hash, state))
            })?;
            rows.collect()
        })
    }

    pub fn count(&self) -> Result<u64, Error> {
        let sql = self.table.count_sql();
        let count: i64 = self.db.with(|conn| conn.query_row(&sql, [], |row| row.get(0)))?;
        Ok(count as u64)
    }

    /// Delete every row.
    ///
    /// Returns the number of deleted entries.
    pub fn clear(&self) -> Result<u64, Error> {
        let sql = self.table.clear_sql();
        let deleted = self.db.with(|conn| conn.execute(&sql, []))?;
        Ok(deleted as u64)
    }
}

impl StorageDriver for SqliteDriver {
    fn select(&self, hash: &str) -> Result<Option<String>, Error> {
        let cell = self.db.with(|conn| {
            conn.prepare_cached(&self.select_sql)?
                .query_row(params![hash], |row| Ok(StoredCell::read(row.get_ref(0)?)))
                .optional()
        })?;
        cell.map(|cell| cell.into_text(hash)).transpose()
    }

    fn upsert(&self, hash: &str, state: &str) -> Result<(), Error> {
        self.db
            .with(|conn| conn.prepare_cached(&self.upsert_sql)?.execute(params![hash, state]))?;
        Ok(())
    }

    fn delete(&self, hash: &str) -> Result<(), Error> {
        self.db.with(|conn| conn.prepare_cached(&self.delete_sql)?.execute(params![hash]))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> SqliteDriver {
        SqliteDriver::new(Database::open_in_memory().unwrap(), Table::default()).unwrap()
    }

    #[test]
    fn test_upsert_and_select() {
        let driver = driver();
        driver.upsert("h1", r#"{"data":"old"}"#).unwrap();
        driver.upsert("h1", r#"{"data":"new"}"#).unwrap();

        assert_eq!(driver.select("h1").unwrap().as_deref(), Some(r#"{"data":"new"}"#));
        assert_eq!(driver.count().unwrap(), 1);
    }

    #[test]
    fn test_select_missing() {
        assert!(driver().select("nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let driver = driver();
        driver.delete("nonexistent").unwrap();

        driver.upsert("h1", "{}").unwrap();
        driver.delete("h1").unwrap();
        assert!(driver.select("h1").unwrap().is_none());
    }

    #[test]
    fn test_create_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let first = SqliteDriver::new(db.clone(), Table::default()).unwrap();
        first.upsert("h1", "{}").unwrap();

        let second = SqliteDriver::new(db, Table::default()).unwrap();
        assert_eq!(second.select("h1").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_null_state_is_unexpected() {
        let driver = driver();
        driver
            .db
            .with(|conn| conn.execute("INSERT INTO query_cache (query_hash, query_state) VALUES ('h1', NULL)", []))
            .unwrap();

        let err = driver.select("h1").unwrap_err();
        assert!(matches!(err, Error::UnexpectedValue { found: "null", .. }));
    }

    #[test]
    fn test_strict_schema_rejects_wrong_types() {
        let driver = driver();
        let result = driver
            .db
            .with(|conn| conn.execute("INSERT INTO query_cache (query_hash, query_state) VALUES ('h1', X'0102')", []));
        assert!(result.is_err());

        let result = driver
            .db
            .with(|conn| conn.execute("INSERT INTO query_cache (query_hash, query_state) VALUES (NULL, '{}')", []));
        assert!(result.is_err());
    }

    #[test]
    fn test_custom_table_and_clear() {
        let driver = SqliteDriver::new(Database::open_in_memory().unwrap(), Table::new("other_cache").unwrap()).unwrap();
        driver.upsert("b", "{}").unwrap();
        driver.upsert("a", "{}").unwrap();

        let hashes: Vec<String> = driver.entries().unwrap().into_iter().map(|(hash, _)| hash).collect();
        assert_eq!(hashes, vec!["a", "b"]);

        assert_eq!(driver.clear().unwrap(), 2);
        assert_eq!(driver.count().unwrap(), 0);
    }
}
