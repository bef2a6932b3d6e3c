//! Position-addressed windows over the local store.

use std::{marker::PhantomData, sync::Arc};

use telemetry_mirror_core::{LocalStore, StoreError};
use thiserror::Error;
use tokio::sync::watch;

/// Paging error.
#[derive(Debug, Error)]
pub enum PageError {
    /// The source was replaced; ask the factory for the current one.
    #[error("Page source generation {generation} was invalidated")]
    Invalidated { generation: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parameters of the first load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialLoadParams {
    /// Position the consumer would like to start at.
    pub requested_start: usize,
    /// Rows the consumer would like to receive.
    pub requested_load_size: usize,
    /// Page size agreed with the consumer.
    pub page_size: usize,
}

/// A contiguous slice of the store with the total it was computed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalWindow<T> {
    pub start_position: usize,
    pub items: Vec<T>,
    pub total_count: usize,
}

fn signed(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Start of the initial window.
///
/// The hint is rounded down to a page boundary, then pulled back so the
/// window still holds `requested_load_size` rows when the list has that
/// many, and floored at 0.
#[must_use]
pub fn compute_initial_load_position(params: &InitialLoadParams, total_count: usize) -> usize {
    let total = signed(total_count);
    let load = signed(params.requested_load_size);
    let page = signed(params.page_size.max(1));

    let page_start = signed(params.requested_start) / page * page;
    // Last page start whose window still encompasses the end of the list.
    let maximum_load_page = (total - load + page - 1) / page * page;

    let position = page_start.min(maximum_load_page).min(total - load).max(0);
    usize::try_from(position).unwrap_or(0)
}

/// Size of the initial window starting at `position`.
#[must_use]
pub fn compute_initial_load_size(
    params: &InitialLoadParams,
    position: usize,
    total_count: usize,
) -> usize {
    total_count
        .saturating_sub(position)
        .min(params.requested_load_size)
}

/// Serves windows of store rows by absolute position.
///
/// Stateless apart from its store and generation. Invalidation is one-way;
/// an invalidated source refuses further loads.
pub struct PositionalPageSource<T, S> {
    store: Arc<S>,
    generation: u64,
    invalidated: watch::Sender<bool>,
    _rows: PhantomData<fn() -> T>,
}

impl<T, S> PositionalPageSource<T, S>
where
    T: Send + 'static,
    S: LocalStore<T>,
{
    pub(crate) fn new(store: Arc<S>, generation: u64) -> Self {
        Self {
            store,
            generation,
            invalidated: watch::channel(false).0,
            _rows: PhantomData,
        }
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        *self.invalidated.borrow()
    }

    /// Mark the source invalid. Returns `false` if it already was.
    pub fn invalidate(&self) -> bool {
        let changed = self
            .invalidated
            .send_if_modified(|invalid| !std::mem::replace(invalid, true));
        if changed {
            tracing::debug!(generation = self.generation, "page source invalidated");
        }
        changed
    }

    /// Resolve once the source has been invalidated.
    pub async fn wait_invalidated(&self) {
        let mut rx = self.invalidated.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|invalid| *invalid).await;
    }

    fn ensure_valid(&self) -> Result<(), PageError> {
        if self.is_invalidated() {
            return Err(PageError::Invalidated {
                generation: self.generation,
            });
        }
        Ok(())
    }

    /// Load the first window.
    ///
    /// # Errors
    /// Returns error if the source was invalidated or the store fails.
    pub async fn load_initial(
        &self,
        params: InitialLoadParams,
    ) -> Result<PositionalWindow<T>, PageError> {
        self.ensure_valid()?;

        let total_count = self.store.count_rows().await?;
        let start_position = compute_initial_load_position(&params, total_count);
        let load_size = compute_initial_load_size(&params, start_position, total_count);
        let items = if load_size == 0 {
            Vec::new()
        } else {
            self.store.read_rows(start_position, load_size).await?
        };

        tracing::debug!(
            generation = self.generation,
            start_position,
            rows = items.len(),
            total_count,
            "initial window loaded"
        );
        Ok(PositionalWindow {
            start_position,
            items,
            total_count,
        })
    }

    /// Load rows `[start_position, start_position + load_size)`.
    ///
    /// A range starting at or past the end yields an empty list. Consumers
    /// request whole pages, so the last request for a list of length `L`
    /// may start exactly at `L`.
    ///
    /// # Errors
    /// Returns error if the source was invalidated or the store fails.
    pub async fn load_range(
        &self,
        start_position: usize,
        load_size: usize,
    ) -> Result<Vec<T>, PageError> {
        self.ensure_valid()?;
        if load_size == 0 {
            return Ok(Vec::new());
        }

        let rows = self.store.read_rows(start_position, load_size).await?;
        if rows.is_empty() {
            tracing::debug!(generation = self.generation, start_position, "range past the end");
        }
        Ok(rows)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::RwLock;

    use async_trait::async_trait;

    use super::*;

    /// Minimal store over a vector.
    #[derive(Default)]
    pub struct VecStore(pub RwLock<Vec<usize>>);

    impl VecStore {
        pub fn with_rows(n: usize) -> Arc<Self> {
            Arc::new(Self(RwLock::new((0..n).collect())))
        }
    }

    #[async_trait]
    impl LocalStore<usize> for VecStore {
        async fn count_rows(&self) -> Result<usize, StoreError> {
            Ok(self.0.read().unwrap().len())
        }

        async fn read_rows(&self, start: usize, count: usize) -> Result<Vec<usize>, StoreError> {
            let rows = self.0.read().unwrap();
            Ok(rows.iter().skip(start).take(count).copied().collect())
        }

        async fn append_rows(&self, rows: Vec<usize>) -> Result<(), StoreError> {
            self.0.write().unwrap().extend(rows);
            Ok(())
        }
    }

    fn params(start: usize, load: usize) -> InitialLoadParams {
        InitialLoadParams {
            requested_start: start,
            requested_load_size: load,
            page_size: 10,
        }
    }

    #[test]
    fn test_initial_position_rules() {
        assert_eq!(compute_initial_load_position(&params(0, 10), 21), 0);
        assert_eq!(compute_initial_load_position(&params(13, 10), 21), 10);
        // Pulled back so the window still holds the requested rows.
        assert_eq!(compute_initial_load_position(&params(30, 10), 21), 11);
        assert_eq!(compute_initial_load_position(&params(30, 20), 21), 1);
        assert_eq!(compute_initial_load_position(&params(5, 10), 0), 0);
        assert_eq!(compute_initial_load_position(&params(50, 10), 5), 0);
    }

    #[test]
    fn test_load_smaller_than_page_near_end() {
        let p = params(39, 1);
        assert_eq!(compute_initial_load_position(&p, 25), 24);
        assert_eq!(compute_initial_load_size(&p, 24, 25), 1);

        let p = params(20, 5);
        let position = compute_initial_load_position(&p, 21);
        assert_eq!(position, 16);
        assert_eq!(compute_initial_load_size(&p, position, 21), 5);
    }

    #[test]
    fn test_initial_window_never_passes_total() {
        for total in 0..35 {
            for start in (0..40).step_by(3) {
                for load in [1, 5, 10, 30] {
                    let p = params(start, load);
                    let position = compute_initial_load_position(&p, total);
                    let size = compute_initial_load_size(&p, position, total);
                    assert!(position <= total);
                    assert!(position + size <= total);
                    assert_eq!(size, load.min(total - position));
                    assert_eq!(size, load.min(total));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_pages_over_21_rows() {
        let source = PositionalPageSource::new(VecStore::with_rows(21), 1);

        let window = source.load_initial(params(0, 10)).await.unwrap();
        assert_eq!(window.start_position, 0);
        assert_eq!(window.items.len(), 10);
        assert_eq!(window.total_count, 21);

        assert_eq!(source.load_range(10, 10).await.unwrap().len(), 10);
        assert_eq!(source.load_range(20, 10).await.unwrap(), vec![20]);
        assert!(source.load_range(21, 10).await.unwrap().is_empty());
        assert!(source.load_range(500, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let source = PositionalPageSource::new(VecStore::with_rows(0), 1);
        let window = source.load_initial(params(0, 10)).await.unwrap();
        assert_eq!(window, PositionalWindow {
            start_position: 0,
            items: Vec::new(),
            total_count: 0,
        });
        assert!(source.load_range(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalidated_source_refuses_loads() {
        let source = PositionalPageSource::new(VecStore::with_rows(5), 3);
        assert!(source.invalidate());
        assert!(!source.invalidate());
        source.wait_invalidated().await;

        let err = source.load_range(0, 10).await.unwrap_err();
        assert!(matches!(err, PageError::Invalidated { generation: 3 }));
    }
}
