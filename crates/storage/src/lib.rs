//! Storage layer: upload ledger persistence.
//!
//! Holds the `LedgerStore` abstraction and its backends: a whole-file JSON
//! snapshot, a keyed SQLite table, and an in-memory store for tests.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::PathBuf;
use thiserror::Error;

pub mod json;
pub mod memory;
pub mod sqlite;

pub use json::JsonSnapshotStore;
pub use memory::MemoryLedgerStore;
pub use sqlite::SqliteLedgerStore;

/// Last known state of a successfully uploaded path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Modification time in seconds since the unix epoch.
    pub mtime: f64,
    /// Hex content digest.
    pub hash: String,
}

/// Ledger entries in insertion order.
pub type LedgerEntries = Vec<(String, FileRecord)>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed ledger snapshot {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("ledger write rejected: {0}")]
    Rejected(String),
}

#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Loads every persisted entry in insertion order. A missing backing
    /// file or table is an empty ledger, not an error.
    async fn load(&self) -> Result<LedgerEntries, LedgerError>;

    /// Makes `path` -> `record` durable. `snapshot` is the full ledger
    /// after the mutation, for backends that rewrite everything.
    async fn persist(
        &self,
        path: &str,
        record: &FileRecord,
        snapshot: &[(String, FileRecord)],
    ) -> Result<(), LedgerError>;
}

pub async fn connect(database_url: &str) -> Result<SqlitePool, LedgerError> {
    let mut url = database_url.to_string();
    if !database_url.starts_with("sqlite:") {
        let path = PathBuf::from(database_url);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let norm = path.to_string_lossy().replace('\\', "/");
        if path.is_absolute() {
            url = format!("sqlite:///{}?mode=rwc", norm.trim_start_matches('/'));
        } else {
            url = format!("sqlite://{}?mode=rwc", norm);
        }
    }
    let mut opts = SqlitePoolOptions::new();
    if url.contains("memory") {
        opts = opts.max_connections(1);
    } else {
        opts = opts.max_connections(5);
    }
    let pool = opts.connect(&url).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), LedgerError> {
    // Applies SQLx migrations located in crates/storage/migrations.
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
