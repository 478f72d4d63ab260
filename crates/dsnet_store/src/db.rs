//! Database abstraction over SQLite via sqlx.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};

use crate::error::StoreError;
use crate::repository::SqliteRepository;

/// Central store handle. Cheap to clone (Arc internally via the pool).
#[derive(Clone)]
pub struct Store {
    pub pool: SqlitePool,
}

impl Store {
    /// Open (or create) the SQLite database at `db_path`.
    /// Runs all pending migrations automatically.
    ///
    /// WAL journal mode and foreign-key enforcement are configured at
    /// connection time here — NOT inside a migration, because SQLite forbids
    /// changing `journal_mode` inside a transaction and sqlx wraps every
    /// migration in one.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Open an in-memory database, migrated and ready — used by tests and
    /// by the test-only `MemoryIndex` double's callers.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn repository(&self) -> SqliteRepository {
        SqliteRepository::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_runs_migrations() {
        let store = Store::open_in_memory().await.expect("open store");
        let repo = store.repository();
        repo.set_parameter("nym", "test-node").await.unwrap();
        assert_eq!(repo.get_parameter("nym").await.unwrap(), Some("test-node".into()));
    }
}
