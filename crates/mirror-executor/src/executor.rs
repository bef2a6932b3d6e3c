//! Streaming session executor.
//!
//! One session opens one connection, runs every step in order and pushes
//! each non-empty result set as a single `RowBatch` onto a bounded channel.
//! Pushing waits for the consumer, so a slow consumer throttles fetching.
//!
//! Cancellation is cooperative: connect, statement execution, every row
//! fetch and every batch push race the session's `CancellationToken`. The
//! first interrupt observed (cancellation or failure) is latched and decides
//! the outcome; anything surfaced afterwards is only logged.

use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use futures::StreamExt;
use telemetry_mirror_core::{
    DriverError, FailureKind, RemoteConnection, RemoteDriver, RemoteSessionDescriptor, RowBatch,
    RowMapper, RowRecord, SessionOutcome, SessionStep, Statement, TypedParam,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;
use uuid::Uuid;

use crate::call::CallBuilder;

/// Default number of batches buffered between a session and its consumer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a session stopped before its last step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    Failed(FailureKind),
}

/// Per-session interrupt latch.
struct SessionState<'t> {
    token: &'t CancellationToken,
    first: Option<Interrupt>,
}

impl<'t> SessionState<'t> {
    const fn new(token: &'t CancellationToken) -> Self {
        Self { token, first: None }
    }

    fn latch(&mut self, interrupt: Interrupt) -> Interrupt {
        *self.first.get_or_insert(interrupt)
    }

    /// Record an observed cancellation.
    fn cancel(&mut self) -> Interrupt {
        if self.first.is_none() {
            tracing::debug!("cancellation observed");
        }
        self.latch(Interrupt::Cancelled)
    }

    /// Record a failure. A pending or latched cancellation wins.
    fn fail(&mut self, kind: FailureKind, cause: &dyn Display) -> Interrupt {
        if self.first.is_none() && self.token.is_cancelled() {
            tracing::debug!(?kind, %cause, "error raised while cancelling, suppressed");
            return self.cancel();
        }
        match self.first {
            None => tracing::warn!(?kind, %cause, "session failed"),
            Some(first) => tracing::debug!(?first, ?kind, %cause, "secondary error suppressed"),
        }
        self.latch(Interrupt::Failed(kind))
    }

    /// Errors while releasing resources never change the outcome.
    fn teardown(&self, cause: &dyn Display) {
        if self.first.is_some() {
            tracing::debug!(%cause, "teardown error after interrupt");
        } else {
            tracing::warn!(%cause, "teardown error");
        }
    }

    fn outcome(&self) -> SessionOutcome {
        match self.first {
            None => SessionOutcome::Completed,
            Some(Interrupt::Cancelled) => SessionOutcome::Cancelled,
            Some(Interrupt::Failed(kind)) => SessionOutcome::Failed(kind),
        }
    }
}

const fn classify(err: &DriverError) -> FailureKind {
    match err {
        DriverError::Connect(_) => FailureKind::Connection,
        DriverError::Query(_) | DriverError::Closed => FailureKind::Query,
        DriverError::Decode(_) => FailureKind::DataFormat,
        DriverError::UnsupportedParameter(_) => FailureKind::InvalidParameter,
    }
}

/// Run `fut` unless the token fires first. `None` means cancelled.
async fn guarded<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = token.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Handle to a running session.
///
/// Dropping the handle cancels the session.
pub struct SessionHandle<T> {
    id: Uuid,
    batches: mpsc::Receiver<RowBatch<T>>,
    token: CancellationToken,
    task: JoinHandle<SessionOutcome>,
    _cancel_on_drop: DropGuard,
}

impl<T> SessionHandle<T> {
    /// Session identifier (also the `session` tracing field).
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Receive the next batch; `None` once the session closed the channel.
    pub async fn recv(&mut self) -> Option<RowBatch<T>> {
        self.batches.recv().await
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that cancels this session.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the terminal outcome.
    ///
    /// Batches not yet received are discarded; a session still trying to push
    /// is treated as cancelled by its consumer.
    pub async fn outcome(self) -> SessionOutcome {
        let Self {
            batches,
            task,
            _cancel_on_drop: guard,
            ..
        } = self;
        drop(batches);
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => SessionOutcome::Cancelled,
        };
        guard.disarm();
        outcome
    }
}

/// Executes remote sessions through a driver.
pub struct StreamingSessionExecutor<D> {
    driver: Arc<D>,
    channel_capacity: usize,
}

impl<D> Clone for StreamingSessionExecutor<D> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            channel_capacity: self.channel_capacity,
        }
    }
}

impl<D: RemoteDriver> StreamingSessionExecutor<D> {
    /// Create an executor.
    #[must_use]
    pub fn new(driver: D) -> Self {
        Self::from_arc(Arc::new(driver))
    }

    /// Create an executor over a shared driver.
    #[must_use]
    pub const fn from_arc(driver: Arc<D>) -> Self {
        Self {
            driver,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Set how many batches may wait in the channel (at least one).
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Start a session on a background task.
    pub fn execute<T, M>(
        &self,
        descriptor: Arc<RemoteSessionDescriptor>,
        mapper: M,
    ) -> SessionHandle<T>
    where
        T: Send + 'static,
        M: RowMapper<T> + 'static,
    {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let token = CancellationToken::new();
        let id = Uuid::new_v4();
        let span = tracing::info_span!("session", %id, steps = descriptor.len());

        let executor = self.clone();
        let session_token = token.clone();
        let task = tokio::spawn(
            async move {
                executor
                    .run(&descriptor, &mapper, tx, &session_token)
                    .await
            }
            .instrument(span),
        );

        SessionHandle {
            id,
            batches: rx,
            _cancel_on_drop: token.clone().drop_guard(),
            token,
            task,
        }
    }

    /// Run a session in place, pushing batches into `sender`.
    ///
    /// The channel is closed (the sender dropped) before this returns.
    pub async fn run<T, M>(
        &self,
        descriptor: &RemoteSessionDescriptor,
        mapper: &M,
        sender: mpsc::Sender<RowBatch<T>>,
        token: &CancellationToken,
    ) -> SessionOutcome
    where
        T: Send,
        M: RowMapper<T>,
    {
        let mut state = SessionState::new(token);
        // The latch already holds any interrupt.
        let _ = self
            .run_session(descriptor, mapper, &sender, &mut state)
            .await;
        drop(sender);

        let outcome = state.outcome();
        tracing::info!(?outcome, "session finished");
        outcome
    }

    async fn run_session<T, M>(
        &self,
        descriptor: &RemoteSessionDescriptor,
        mapper: &M,
        sender: &mpsc::Sender<RowBatch<T>>,
        state: &mut SessionState<'_>,
    ) -> Result<(), Interrupt>
    where
        T: Send,
        M: RowMapper<T>,
    {
        let target = descriptor.connection_target();
        let mut conn = match guarded(state.token, self.driver.connect(target)).await {
            None => return Err(state.cancel()),
            Some(Err(e)) => return Err(state.fail(FailureKind::Connection, &e)),
            Some(Ok(conn)) => conn,
        };
        tracing::debug!("connected");

        let result = run_steps(conn.as_mut(), descriptor, mapper, sender, state).await;

        match tokio::time::timeout(CLOSE_TIMEOUT, conn.close()).await {
            Ok(Ok(())) => tracing::debug!("connection closed"),
            Ok(Err(e)) => state.teardown(&e),
            Err(_) => state.teardown(&"timed out closing connection"),
        }
        result
    }
}

async fn run_steps<T, M>(
    conn: &mut dyn RemoteConnection,
    descriptor: &RemoteSessionDescriptor,
    mapper: &M,
    sender: &mpsc::Sender<RowBatch<T>>,
    state: &mut SessionState<'_>,
) -> Result<(), Interrupt>
where
    T: Send,
    M: RowMapper<T>,
{
    let calls = CallBuilder::new(conn.call_syntax());

    for (step, entry) in descriptor.steps().enumerate() {
        if state.token.is_cancelled() {
            return Err(state.cancel());
        }

        let statement = match entry {
            SessionStep::Query(sql) => Statement::query(sql),
            SessionStep::Call(call) => calls
                .build(call)
                .map_err(|e| state.fail(FailureKind::InvalidParameter, &e))?,
        };
        let params: Vec<_> = statement.params.iter().map(TypedParam::tag).collect();
        tracing::debug!(step, sql = %statement.sql, ?params, "executing step");

        let rows = fetch_rows(conn, &statement, mapper, state).await?;
        let count = rows.len();
        let Some(batch) = RowBatch::new(step, rows) else {
            tracing::debug!(step, "step returned no rows");
            continue;
        };

        match guarded(state.token, sender.send(batch)).await {
            None => return Err(state.cancel()),
            Some(Err(_)) => {
                tracing::debug!(step, "consumer dropped the channel");
                return Err(state.cancel());
            }
            Some(Ok(())) => tracing::debug!(step, rows = count, "batch pushed"),
        }
    }
    Ok(())
}

async fn fetch_rows<T, M>(
    conn: &mut dyn RemoteConnection,
    statement: &Statement,
    mapper: &M,
    state: &mut SessionState<'_>,
) -> Result<Vec<T>, Interrupt>
where
    M: RowMapper<T>,
{
    let token = state.token;
    let mut stream = match guarded(token, conn.execute(statement)).await {
        None => return Err(state.cancel()),
        Some(Err(e)) => return Err(state.fail(classify(&e), &e)),
        Some(Ok(stream)) => stream,
    };

    let mut rows = Vec::new();
    loop {
        let Some(next) = guarded(token, stream.next()).await else {
            return Err(state.cancel());
        };
        let Some(raw) = next else {
            break;
        };
        let raw = raw.map_err(|e| state.fail(classify(&e), &e))?;
        let record = RowRecord::from_columns(raw);
        let row = mapper
            .map_row(&record)
            .map_err(|e| state.fail(FailureKind::DataFormat, &e))?;
        rows.push(row);
    }
    Ok(rows)
}
