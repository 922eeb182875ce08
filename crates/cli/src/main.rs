//! qpersist command-line entry point.
//!
//! Inspects and maintains a persisted query cache table. Logging goes to
//! stderr so command output on stdout stays scriptable.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use qpersist_core::query::compute_query_hash;
use qpersist_core::{
    Database, PersistConfig, PersistOptions, QueryKey, QueryState, SqliteDriver, StorageDriver, Table,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qpersist")]
#[command(version)]
#[command(about = "Inspect and maintain a persisted query cache")]
struct Cli {
    /// Database file (overrides QPERSIST_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Table name (overrides QPERSIST_TABLE_NAME)
    #[arg(long, global = true)]
    table: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List persisted entries
    List,

    /// Print the stored state of one entry
    Show {
        /// Query fingerprint
        hash: String,
    },

    /// Delete one entry
    Remove {
        /// Query fingerprint
        hash: String,
    },

    /// Delete every entry
    Clear,

    /// Print the fingerprint of a query key given as a JSON array
    Hash {
        /// e.g. '["todos", {"page": 1}]'
        key: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Hash { key } => {
            let key: QueryKey = serde_json::from_str(&key).context("query key must be a JSON array")?;
            println!("{}", compute_query_hash(&key));
        }
        Commands::List => list(&open_driver(cli.db, cli.table)?)?,
        Commands::Show { hash } => {
            let Some(blob) = open_driver(cli.db, cli.table)?.select(&hash)? else {
                bail!("no entry for {hash}");
            };
            let value: serde_json::Value = serde_json::from_str(&blob).context("stored state is not valid JSON")?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Remove { hash } => {
            open_driver(cli.db, cli.table)?.delete(&hash)?;
            tracing::info!(query_hash = %hash, "removed entry");
        }
        Commands::Clear => {
            let deleted = open_driver(cli.db, cli.table)?.clear()?;
            println!("{deleted}");
        }
    }

    Ok(())
}

/// Load configuration, apply command-line overrides and open the table.
fn open_driver(db: Option<PathBuf>, table: Option<String>) -> Result<SqliteDriver> {
    let mut config = PersistConfig::load()?;
    if let Some(db) = db {
        config.db_path = db;
    }
    if let Some(table) = table {
        config.table_name = table;
    }
    config.validate()?;

    let options = PersistOptions::from_config(&config);
    let db = Database::open_with_config(&config)?;
    Ok(SqliteDriver::new(db, Table::new(&options.table_name)?)?)
}

fn list(driver: &SqliteDriver) -> Result<()> {
    for (hash, blob) in driver.entries()? {
        let Some(blob) = blob else {
            println!("{hash}\t-\tunreadable\t-");
            continue;
        };
        match serde_json::from_str::<QueryState>(&blob) {
            Ok(state) => {
                let status = serde_json::to_value(state.status)?;
                println!(
                    "{hash}\t{}\t{}\t{}",
                    blob.len(),
                    status.as_str().unwrap_or("?"),
                    state.data_updated_at
                );
            }
            Err(_) => println!("{hash}\t{}\tunreadable\t-", blob.len()),
        }
    }
    Ok(())
}
