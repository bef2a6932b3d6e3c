//! SQLite row store (feature-gated).

use std::{marker::PhantomData, str::FromStr};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use telemetry_mirror_core::{LocalStore, StoreError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS mirror_rows (
    position INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL
)";

/// SQLite storage implementation.
///
/// Rows are kept as JSON payloads in insertion order.
pub struct SqliteStore<T> {
    pool: SqlitePool,
    _rows: PhantomData<fn() -> T>,
}

fn internal(e: sqlx::Error) -> StoreError {
    StoreError::Internal(e.to_string())
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl<T> SqliteStore<T> {
    /// Open (creating if missing) the database at `url`.
    ///
    /// # Errors
    /// Returns error if database connection fails.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(internal)?
            .create_if_missing(true);
        // An in-memory database exists per connection.
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(internal)?;
        Self::with_pool(pool).await
    }

    /// Use an existing pool.
    ///
    /// # Errors
    /// Returns error if the table cannot be created.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA).execute(&pool).await.map_err(internal)?;
        tracing::debug!("sqlite store ready");
        Ok(Self {
            pool,
            _rows: PhantomData,
        })
    }
}

#[async_trait]
impl<T> LocalStore<T> for SqliteStore<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    async fn count_rows(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mirror_rows")
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn read_rows(&self, start: usize, count: usize) -> Result<Vec<T>, StoreError> {
        let payloads: Vec<String> = sqlx::query_scalar(
            "SELECT payload FROM mirror_rows ORDER BY position LIMIT ? OFFSET ?",
        )
        .bind(to_i64(count))
        .bind(to_i64(start))
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        payloads
            .iter()
            .map(|payload| {
                serde_json::from_str(payload).map_err(|e| StoreError::Codec(e.to_string()))
            })
            .collect()
    }

    async fn append_rows(&self, rows: Vec<T>) -> Result<(), StoreError> {
        let payloads = rows
            .iter()
            .map(|row| serde_json::to_string(row).map_err(|e| StoreError::Codec(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await.map_err(internal)?;
        for payload in &payloads {
            sqlx::query("INSERT INTO mirror_rows (payload) VALUES (?)")
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;
        }
        tx.commit().await.map_err(internal)?;
        tracing::debug!(rows = payloads.len(), "rows appended");
        Ok(())
    }
}
