use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::repository::{ContextId, DEFAULT_QUOTA_BYTES, KeyValueStore, Storage, StoreChange};

mod kv_repo;
mod migrate;

const CHANGE_BUFFER: usize = 256;

/// `SQLite`-backed key-value store.
///
/// Handles opened with [`SqliteKeyValueStore::handle`] share the pool and an
/// in-process change feed. Writers in other processes are not announced; they
/// are picked up by callers that poll.
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
    changes: broadcast::Sender<StoreChange>,
    origin: ContextId,
    quota: usize,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteKeyValueStore {
    /// Connect to `SQLite` using the given URL.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or
    /// the connection pragmas fail.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Ok(Self {
            pool,
            changes,
            origin: ContextId::next(),
            quota: DEFAULT_QUOTA_BYTES,
        })
    }

    #[must_use]
    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota = quota;
        self
    }

    /// Open another context over the same database.
    #[must_use]
    pub fn handle(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            changes: self.changes.clone(),
            origin: ContextId::next(),
            quota: self.quota,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str, quota: usize) -> Result<Self, SqliteInitError> {
        let repo = SqliteKeyValueStore::connect(database_url)
            .await?
            .with_quota(quota);
        repo.migrate().await?;
        let kv: Arc<dyn KeyValueStore> = Arc::new(repo);
        Ok(Self { kv })
    }
}
