//! SQLite backing for the grab history store.
//!
//! A file database runs in WAL mode with a busy timeout so a polling
//! failure check and a manual `mark-failed` can share it. Schema lives in
//! `migrations/` and is applied on every open.
//!
//! ```no_run
//! use releasegate_core::{Database, SqliteHistory};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let history = SqliteHistory::new(Database::new(Path::new("releasegate.db")).await?);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

/// Pool size for file databases. SQLite serializes writers anyway.
const FILE_POOL_SIZE: u32 = 4;

/// How long a writer waits on a locked database, in milliseconds.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Failures opening the history database.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("cannot open history database: {0}\n  Suggestion: Check that the directory exists and is writable")]
    Connection(#[from] sqlx::Error),

    #[error("history schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Shared handle to the history database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the database file at `db_path`, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the file cannot be opened or
    /// configured, [`DbError::Migration`] if the schema cannot be applied.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_POOL_SIZE)
            .connect(&format!("sqlite:{}?mode=rwc", db_path.display()))
            .await?;

        for pragma in [
            "PRAGMA journal_mode=WAL".to_string(),
            format!("PRAGMA busy_timeout={BUSY_TIMEOUT_MS}"),
        ] {
            sqlx::query(&pragma).execute(&pool).await?;
        }

        Self::migrated(pool).await
    }

    /// Opens a private in-memory database.
    ///
    /// Each `sqlite::memory:` connection is a separate database, so the pool
    /// holds exactly one.
    ///
    /// # Errors
    ///
    /// Same as [`Database::new`].
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("history schema up to date");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current journal mode, lowercased (`wal`, `memory`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the pragma query fails.
    pub async fn journal_mode(&self) -> Result<String, DbError> {
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(mode.to_lowercase())
    }

    /// Closes every pooled connection; later queries fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
