//! In-memory row store.

use std::sync::RwLock;

use async_trait::async_trait;
use telemetry_mirror_core::{LocalStore, StoreError};

/// In-memory store implementation.
///
/// Useful for tests and single-process deployments.
/// Data is lost on restart.
pub struct MemoryStore<T> {
    rows: RwLock<Vec<T>>,
}

impl<T> MemoryStore<T> {
    /// Create an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned(e: impl std::fmt::Display) -> StoreError {
    StoreError::Internal(e.to_string())
}

#[async_trait]
impl<T> LocalStore<T> for MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn count_rows(&self) -> Result<usize, StoreError> {
        Ok(self.rows.read().map_err(poisoned)?.len())
    }

    async fn read_rows(&self, start: usize, count: usize) -> Result<Vec<T>, StoreError> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows.iter().skip(start).take(count).cloned().collect())
    }

    async fn append_rows(&self, rows: Vec<T>) -> Result<(), StoreError> {
        // One write lock per batch, so readers see all of it or none.
        self.rows.write().map_err(poisoned)?.extend(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_read() {
        let store: MemoryStore<&str> = MemoryStore::new();
        store.append_rows(vec!["a", "b", "c"]).await.unwrap();
        store.append_rows(vec!["d"]).await.unwrap();

        assert_eq!(store.count_rows().await.unwrap(), 4);
        assert_eq!(store.read_rows(1, 2).await.unwrap(), vec!["b", "c"]);
        assert_eq!(store.read_rows(3, 10).await.unwrap(), vec!["d"]);
        assert!(store.read_rows(4, 10).await.unwrap().is_empty());
    }
}
