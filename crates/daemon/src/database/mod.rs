//! Durable path→timestamp records backing node attributes.
//!
//! Object stores report nothing useful for synthesized directories, so every
//! path ever instantiated gets a row here: created/updated/accessed times
//! with first-write-wins insertion. The store is advisory - durability is
//! deliberately relaxed (no journal, no fsync) and losing the most recent
//! update on crash is acceptable.
//!
//! The database is constructed once and passed by clone into every node;
//! there is no process-wide default instance.

use std::ops::Deref;
use std::path::Path;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use time::OffsetDateTime;
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS paths (
    path        TEXT PRIMARY KEY,
    created_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    accessed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Handle to the SQLite metadata store. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Database(SqlitePool);

impl Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Database {
    /// Opens (creating if missing) the database at `path` and ensures the
    /// schema exists. Journal and synchronous writes are off: the store is a
    /// timestamp cache, not a source of truth.
    pub async fn connect(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Off)
            .synchronous(SqliteSynchronous::Off);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self(pool))
    }

    /// Ephemeral in-memory database. A single connection keeps every query
    /// on the same store.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self(pool))
    }

    /// Registers a path and returns its stored `updated_at`.
    ///
    /// First write wins: re-inserting an existing path leaves the record
    /// untouched and hands back the original timestamp, which is what keeps
    /// directory attributes stable across remounts.
    pub async fn insert_path(&self, path: &str) -> Result<OffsetDateTime, sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO paths (path) VALUES (?1)")
            .bind(path)
            .execute(&**self)
            .await?;

        let row = sqlx::query("SELECT updated_at FROM paths WHERE path = ?1")
            .bind(path)
            .fetch_one(&**self)
            .await?;
        let updated_at: OffsetDateTime = row.get("updated_at");

        debug!(path, %updated_at, "registered path");
        Ok(updated_at)
    }

    /// Stamps `accessed_at` with the current time.
    pub async fn update_access(&self, path: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE paths SET accessed_at = CURRENT_TIMESTAMP WHERE path = ?1")
            .bind(path)
            .execute(&**self)
            .await?;
        Ok(())
    }

    /// Stamps `updated_at` with the current time.
    pub async fn update_modified(&self, path: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE paths SET updated_at = CURRENT_TIMESTAMP WHERE path = ?1")
            .bind(path)
            .execute(&**self)
            .await?;
        Ok(())
    }
}
