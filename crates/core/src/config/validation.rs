//! Configuration validation rules.
//!
//! This module provides validation logic for `PersistConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::PersistConfig;
use crate::storage::schema::is_identifier;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl PersistConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `db_path` is empty, and
    /// `ConfigError::Invalid` if:
    /// - `table_name` is not a plain SQL identifier
    /// - `busy_timeout_ms` exceeds one minute
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "db_path".into(),
                hint: "Set QPERSIST_DB_PATH environment variable".into(),
            });
        }

        if !is_identifier(&self.table_name) {
            return Err(ConfigError::Invalid {
                field: "table_name".into(),
                reason: "must match [A-Za-z_][A-Za-z0-9_]* and be at most 64 characters".into(),
            });
        }

        if self.busy_timeout_ms > 60_000 {
            return Err(ConfigError::Invalid {
                field: "busy_timeout_ms".into(),
                reason: "must not exceed 1 minute (60000ms)".into(),
            });
        }

        if self.busy_timeout_ms == 0 {
            tracing::warn!("busy_timeout_ms is 0; locked database writes will fail immediately");
        }

        Ok(())
    }
}
