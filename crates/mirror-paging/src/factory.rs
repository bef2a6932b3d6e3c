//! Page source factory with generation tracking.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use telemetry_mirror_core::LocalStore;
use tokio::sync::watch;

use crate::source::PositionalPageSource;

type Latest<T, S> = Option<Arc<PositionalPageSource<T, S>>>;

/// Creates page sources and publishes the most recent one.
///
/// Every created source gets the next generation number. Invalidation always
/// targets the latest published generation.
pub struct PositionalPageSourceFactory<T, S> {
    store: Arc<S>,
    generation: AtomicU64,
    latest: watch::Sender<Latest<T, S>>,
}

impl<T, S> PositionalPageSourceFactory<T, S>
where
    T: Send + 'static,
    S: LocalStore<T>,
{
    /// Create a factory over a store. No source exists until `create()`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            generation: AtomicU64::new(0),
            latest: watch::channel(None).0,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Generation of the most recently created source (0 before the first).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Create a source for the next generation and publish it.
    pub fn create(&self) -> Arc<PositionalPageSource<T, S>> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let source = Arc::new(PositionalPageSource::new(Arc::clone(&self.store), generation));

        // A racing create may already have published a newer generation.
        self.latest.send_if_modified(|latest| {
            if latest.as_ref().is_some_and(|s| s.generation() > generation) {
                return false;
            }
            *latest = Some(Arc::clone(&source));
            true
        });
        tracing::debug!(generation, "page source created");
        source
    }

    /// The most recently published source.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<PositionalPageSource<T, S>>> {
        self.latest.borrow().clone()
    }

    /// Follow published sources.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Latest<T, S>> {
        self.latest.subscribe()
    }

    /// Invalidate the latest source.
    ///
    /// Returns the generation that was invalidated, or `None` if there was no
    /// live source.
    pub fn invalidate(&self) -> Option<u64> {
        let latest = self.latest()?;
        latest.invalidate().then(|| latest.generation())
    }

    /// The latest source if still valid, otherwise a freshly created one.
    pub fn current(&self) -> Arc<PositionalPageSource<T, S>> {
        match self.latest() {
            Some(source) if !source.is_invalidated() => source,
            _ => self.create(),
        }
    }
}
