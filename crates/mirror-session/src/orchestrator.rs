//! Refresh orchestrator: run an archive session and ingest its batches.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::NaiveDateTime;
use telemetry_mirror_core::{
    FailureKind, LocalStore, MirrorConfig, RemoteDriver, RowMapper, SessionOutcome, StoreError,
};
use telemetry_mirror_executor::StreamingSessionExecutor;
use telemetry_mirror_paging::PositionalPageSourceFactory;
use tokio_util::sync::CancellationToken;

use crate::{
    archive::{TimeRange, archive_descriptor, catalog_descriptor},
    sample::TelemetrySample,
};

/// Refresh error.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("Invalid time range: {begin} is not before {end}")]
    InvalidRange {
        begin: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error("Refresh already running for device {0}")]
    AlreadyRunning(i32),
    #[error("Remote session failed: {0:?}")]
    Failed(FailureKind),
    #[error("Remote session was cancelled")]
    Cancelled,
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl RefreshError {
    /// Whether the caller should report a connectivity problem.
    ///
    /// Every failed session counts; the finer kind is in the logs.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// How a refresh that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed,
    Cancelled,
}

/// What a refresh ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub device: i32,
    pub outcome: RefreshOutcome,
    pub batches: usize,
    pub rows: usize,
    /// Page source generation invalidated after completion.
    pub invalidated_generation: Option<u64>,
}

type ActiveMap = Mutex<HashMap<i32, CancellationToken>>;

/// Registration of an in-flight refresh; removed on drop.
struct ActiveRefresh<'a> {
    active: &'a ActiveMap,
    device: i32,
    token: CancellationToken,
}

impl<'a> ActiveRefresh<'a> {
    fn claim(active: &'a ActiveMap, device: i32) -> Result<Self, RefreshError> {
        let mut map = active.lock().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&device) {
            return Err(RefreshError::AlreadyRunning(device));
        }
        let token = CancellationToken::new();
        map.insert(device, token.clone());
        Ok(Self {
            active,
            device,
            token,
        })
    }
}

impl Drop for ActiveRefresh<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.device);
    }
}

/// Runs archive refreshes into a local store and keeps paging current.
///
/// At most one refresh runs per device.
pub struct RefreshOrchestrator<D, S> {
    config: MirrorConfig,
    executor: StreamingSessionExecutor<D>,
    pages: Arc<PositionalPageSourceFactory<TelemetrySample, S>>,
    active: ActiveMap,
}

impl<D, S> RefreshOrchestrator<D, S>
where
    D: RemoteDriver,
    S: LocalStore<TelemetrySample> + 'static,
{
    /// Create an orchestrator over a driver and a store.
    #[must_use]
    pub fn new(config: MirrorConfig, driver: D, store: Arc<S>) -> Self {
        let executor =
            StreamingSessionExecutor::new(driver).with_channel_capacity(config.channel_capacity);
        Self {
            config,
            executor,
            pages: Arc::new(PositionalPageSourceFactory::new(store)),
            active: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Page source factory over the store this orchestrator fills.
    #[must_use]
    pub const fn pages(&self) -> &Arc<PositionalPageSourceFactory<TelemetrySample, S>> {
        &self.pages
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        self.pages.store()
    }

    /// Whether a refresh is in flight for `device`.
    #[must_use]
    pub fn is_refreshing(&self, device: i32) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&device)
    }

    /// Cancel the refresh of `device`. Returns `false` if none was running.
    pub fn cancel(&self, device: i32) -> bool {
        let map = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(&device).is_some_and(|token| {
            token.cancel();
            tracing::info!(device, "refresh cancel requested");
            true
        })
    }

    /// Validate `[begin, end)` and refresh it.
    ///
    /// # Errors
    /// Returns `InvalidRange` before any remote work, or any `refresh` error.
    pub async fn refresh_between(
        &self,
        device: i32,
        begin: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<RefreshReport, RefreshError> {
        self.refresh(device, TimeRange::new(begin, end)?).await
    }

    /// Fetch the archive of `device` for `range` and append it to the store.
    ///
    /// Batches are persisted as they arrive. A completed refresh invalidates
    /// the current page source; a cancelled one keeps what was persisted.
    ///
    /// # Errors
    /// Returns error if a refresh is already running for the device, the
    /// remote session fails, or the store rejects a batch.
    pub async fn refresh(
        &self,
        device: i32,
        range: TimeRange,
    ) -> Result<RefreshReport, RefreshError> {
        let claim = ActiveRefresh::claim(&self.active, device)?;
        let descriptor = Arc::new(archive_descriptor(&self.config, device, range));
        let mut session = self.executor.execute(descriptor, TelemetrySample::from_row);
        tracing::info!(
            device,
            session = %session.id(),
            begin = %range.begin(),
            end = %range.end(),
            "refresh started"
        );

        let mut batches = 0;
        let mut rows = 0;
        let mut interrupted = false;
        loop {
            let batch = tokio::select! {
                biased;
                () = claim.token.cancelled() => {
                    interrupted = true;
                    None
                }
                batch = session.recv() => batch,
            };
            let Some(batch) = batch else { break };

            let count = batch.len();
            if let Err(e) = self.store().append_rows(batch.into_rows()).await {
                tracing::warn!(device, error = %e, "failed to persist batch");
                session.cancel();
                let outcome = session.outcome().await;
                tracing::debug!(device, ?outcome, "session stopped after store failure");
                return Err(RefreshError::Store(e));
            }
            batches += 1;
            rows += count;
            tracing::debug!(device, rows = count, "batch persisted");
        }

        if interrupted {
            // Batches still in the channel were not persisted, whatever the
            // session itself reports.
            session.cancel();
        }
        let outcome = match session.outcome().await {
            session_outcome if interrupted => {
                tracing::debug!(device, ?session_outcome, "refresh interrupted while draining");
                RefreshOutcome::Cancelled
            }
            SessionOutcome::Completed => RefreshOutcome::Completed,
            SessionOutcome::Cancelled => RefreshOutcome::Cancelled,
            SessionOutcome::Failed(kind) => {
                tracing::warn!(device, ?kind, batches, rows, "refresh failed");
                return Err(RefreshError::Failed(kind));
            }
        };

        let invalidated_generation = match outcome {
            RefreshOutcome::Completed => self.pages.invalidate(),
            RefreshOutcome::Cancelled => None,
        };
        tracing::info!(device, ?outcome, batches, rows, "refresh finished");
        Ok(RefreshReport {
            device,
            outcome,
            batches,
            rows,
            invalidated_generation,
        })
    }

    /// Run catalog queries and collect every mapped row.
    ///
    /// Catalog rows are returned to the caller, not stored.
    ///
    /// # Errors
    /// Returns error if the session fails or is cancelled.
    pub async fn load_catalog<T, M, I, Q>(
        &self,
        queries: I,
        mapper: M,
    ) -> Result<Vec<T>, RefreshError>
    where
        T: Send + 'static,
        M: RowMapper<T> + 'static,
        I: IntoIterator<Item = Q>,
        Q: Into<String>,
    {
        let descriptor = Arc::new(catalog_descriptor(&self.config, queries));
        let mut session = self.executor.execute(descriptor, mapper);

        let mut rows = Vec::new();
        while let Some(batch) = session.recv().await {
            rows.extend(batch.into_rows());
        }
        match session.outcome().await {
            SessionOutcome::Completed => Ok(rows),
            SessionOutcome::Cancelled => Err(RefreshError::Cancelled),
            SessionOutcome::Failed(kind) => Err(RefreshError::Failed(kind)),
        }
    }
}
