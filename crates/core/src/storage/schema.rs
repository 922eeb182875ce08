//! The persisted table and the SQL issued against it.
//!
//! The table name is interpolated into every statement, so it is validated
//! as a plain identifier when a [`Table`] is built.

use crate::Error;

/// Default table name.
pub const DEFAULT_TABLE: &str = "query_cache";

const MAX_NAME_LEN: usize = 64;

/// A validated table name plus the statements for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
}

impl Table {
    /// Validate `name` as `[A-Za-z_][A-Za-z0-9_]*` (at most 64 chars).
    pub fn new(name: &str) -> Result<Self, Error> {
        if is_identifier(name) {
            Ok(Self { name: name.to_string() })
        } else {
            Err(Error::InvalidTableName(name.to_string()))
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                query_hash TEXT NOT NULL UNIQUE,
                query_state TEXT
            ) STRICT",
            self.name
        )
    }

    pub fn select_sql(&self) -> String {
        format!("SELECT query_state FROM {} WHERE query_hash = ?1", self.name)
    }

    pub fn upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (query_hash, query_state) VALUES (?1, ?2)
            ON CONFLICT(query_hash) DO UPDATE SET
                query_state = excluded.query_state",
            self.name
        )
    }

    pub fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE query_hash = ?1", self.name)
    }

    pub fn entries_sql(&self) -> String {
        format!("SELECT query_hash, query_state FROM {} ORDER BY query_hash", self.name)
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM {}", self.name)
    }

    pub fn clear_sql(&self) -> String {
        format!("DELETE FROM {}", self.name)
    }
}

impl Default for Table {
    fn default() -> Self {
        Self { name: DEFAULT_TABLE.to_string() }
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_NAME_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
