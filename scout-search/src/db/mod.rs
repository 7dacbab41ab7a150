//! Database access for scout-search
//!
//! One SQLite file in the root folder holds the session snapshots.

pub mod snapshots;

pub use snapshots::SqliteSnapshotStore;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite busy_timeout per connection
const BUSY_TIMEOUT_MS: u64 = 250;

/// Pool size; snapshot writes are short and serialized per session
const MAX_CONNECTIONS: u32 = 8;

/// Initialize database connection pool
///
/// Creates the file (and its parent directory) if missing, then the tables.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::debug!("Connecting to database: {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(
            SqliteConnectOptions::from_str(db_path.to_str().context("Invalid database path")?)
                .context("Failed to parse database path")?
                .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true),
        )
        .await
        .context("Failed to create database pool")?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create scout-search tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_snapshots (
            session_id TEXT PRIMARY KEY,
            snapshot_version INTEGER NOT NULL,
            status TEXT NOT NULL,
            current_stage TEXT NOT NULL,
            saved_at TEXT NOT NULL,
            data TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_session_snapshots_saved_at ON session_snapshots (saved_at)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (session_snapshots)");

    Ok(())
}
