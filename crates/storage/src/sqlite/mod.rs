use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use quiz_core::weights::WeightEngine;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{CatalogRepository, StatsStore, Storage, StorageError};

mod catalog_repo;
mod mapping;
mod migrate;
mod stats_repo;

/// SQLite-backed store for the catalog, stats, and progress cursor.
///
/// Holds the weight engine so attempt recording can recompute weights inside
/// the same transaction that bumps the counters.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    engine: Arc<WeightEngine>,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Bounded retry policy for transient `SQLITE_BUSY` failures. Exhausted
/// retries propagate `StorageError::Busy` to the caller.
pub(crate) const BUSY_RETRIES: u32 = 3;
pub(crate) const BUSY_BACKOFF: Duration = Duration::from_millis(50);

pub(crate) fn map_sqlx_err(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        // SQLITE_BUSY = 5, SQLITE_LOCKED = 6, SQLITE_BUSY_SNAPSHOT = 517.
        let code = db.code();
        if matches!(code.as_deref(), Some("5" | "6" | "517"))
            || db.message().contains("database is locked")
        {
            return StorageError::Busy(db.message().to_string());
        }
    }
    StorageError::Connection(e.to_string())
}

/// Run `op`, retrying on `StorageError::Busy` with linear backoff.
///
/// `op` returns a fresh future per call (a `*_once` async fn on the store),
/// so each retry re-runs the whole statement. The futures must be `Send`
/// because the trait methods wrapping this run inside boxed `Send` futures.
pub(crate) async fn with_busy_retry<T, F, Fut>(mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>> + Send,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Err(StorageError::Busy(_)) if attempt + 1 < BUSY_RETRIES => {
                attempt += 1;
                tokio::time::sleep(BUSY_BACKOFF * attempt).await;
            }
            result => return result,
        }
    }
}

impl SqliteStore {
    /// Connect to `SQLite` using the given URL.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or if
    /// the setup pragmas fail.
    pub async fn connect(database_url: &str, engine: WeightEngine) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON;")
                        .execute(&mut *conn)
                        .await?;
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
        Ok(Self {
            pool,
            engine: Arc::new(engine),
        })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn engine(&self) -> &WeightEngine {
        &self.engine
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
    pub async fn sqlite(
        database_url: &str,
        engine: WeightEngine,
    ) -> Result<Self, SqliteInitError> {
        let store = SqliteStore::connect(database_url, engine).await?;
        store.migrate().await?;
        let catalog: Arc<dyn CatalogRepository> = Arc::new(store.clone());
        let stats: Arc<dyn StatsStore> = Arc::new(store);
        Ok(Self { catalog, stats })
    }
}
