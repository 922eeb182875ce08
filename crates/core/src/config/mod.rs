//! Persistence configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (QPERSIST_*)
//! 2. TOML config file (if QPERSIST_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::storage::DEFAULT_TABLE;

mod validation;

pub use validation::ConfigError;

/// Where and how query state is persisted.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (QPERSIST_*)
/// 2. TOML config file (if QPERSIST_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Path to the SQLite database.
    ///
    /// Set via QPERSIST_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Table holding persisted query state.
    ///
    /// Set via QPERSIST_TABLE_NAME environment variable.
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// How long a connection waits on a locked database, in milliseconds.
    ///
    /// Set via QPERSIST_BUSY_TIMEOUT_MS environment variable.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Whether to open file databases in WAL journal mode.
    ///
    /// Set via QPERSIST_WAL environment variable.
    #[serde(default = "default_true")]
    pub wal: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./query-cache.sqlite")
}

fn default_table_name() -> String {
    DEFAULT_TABLE.into()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            table_name: default_table_name(),
            busy_timeout_ms: default_busy_timeout_ms(),
            wal: true,
        }
    }
}

impl PersistConfig {
    /// Busy timeout as Duration for rusqlite.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `QPERSIST_`
    /// 2. TOML file from `QPERSIST_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("QPERSIST_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("QPERSIST_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
