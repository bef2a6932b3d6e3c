//! Consumer-side page cursor.

use std::sync::Arc;

use telemetry_mirror_core::LocalStore;

use crate::{
    factory::PositionalPageSourceFactory,
    source::{InitialLoadParams, PageError, PositionalPageSource, PositionalWindow},
};

/// Reads pages through the factory's current source.
///
/// When the held source has been invalidated the view picks up the
/// replacement and retries once.
pub struct PagedView<T, S> {
    factory: Arc<PositionalPageSourceFactory<T, S>>,
    source: Arc<PositionalPageSource<T, S>>,
    page_size: usize,
}

impl<T, S> PagedView<T, S>
where
    T: Send + 'static,
    S: LocalStore<T>,
{
    #[must_use]
    pub fn new(factory: Arc<PositionalPageSourceFactory<T, S>>, page_size: usize) -> Self {
        let source = factory.current();
        Self {
            factory,
            source,
            page_size: page_size.max(1),
        }
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Generation of the source currently in use.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.source.generation()
    }

    fn refresh_source(&mut self) {
        self.source = self.factory.current();
        tracing::debug!(generation = self.source.generation(), "view switched source");
    }

    /// Load the first window around `requested_start`.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn initial(
        &mut self,
        requested_start: usize,
        requested_load_size: usize,
    ) -> Result<PositionalWindow<T>, PageError> {
        let params = InitialLoadParams {
            requested_start,
            requested_load_size,
            page_size: self.page_size,
        };
        match self.source.load_initial(params).await {
            Err(PageError::Invalidated { .. }) => {
                self.refresh_source();
                self.source.load_initial(params).await
            }
            other => other,
        }
    }

    /// Load page `index` (zero-based).
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn page(&mut self, index: usize) -> Result<Vec<T>, PageError> {
        let start = index.saturating_mul(self.page_size);
        match self.source.load_range(start, self.page_size).await {
            Err(PageError::Invalidated { .. }) => {
                self.refresh_source();
                self.source.load_range(start, self.page_size).await
            }
            other => other,
        }
    }
}
