//! In-memory scripted driver.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use telemetry_mirror_core::{
    CallSyntax, DriverError, RawRow, RemoteConnection, RemoteDriver, RowStream, Statement,
};

/// Failure a scripted statement reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    Query,
    Decode,
    UnsupportedParameter,
    Closed,
}

impl ScriptedFailure {
    fn to_error(self, sql: &str) -> DriverError {
        match self {
            Self::Query => DriverError::Query(format!("scripted failure in {sql}")),
            Self::Decode => DriverError::Decode(format!("scripted bad column in {sql}")),
            Self::UnsupportedParameter => {
                DriverError::UnsupportedParameter(format!("scripted bind failure in {sql}"))
            }
            Self::Closed => DriverError::Closed,
        }
    }
}

/// What executing a statement produces.
#[derive(Debug, Clone)]
pub enum ScriptedResult {
    /// A complete result set.
    Rows(Vec<RawRow>),
    /// Execution itself fails.
    Error(ScriptedFailure),
    /// Some rows, then a fetch failure.
    RowsThenError(Vec<RawRow>, ScriptedFailure),
    /// Some rows, then the fetch never finishes.
    RowsThenHang(Vec<RawRow>),
    /// Execution never returns.
    Hang,
}

/// What the driver observed, for assertions.
#[derive(Debug, Clone, Default)]
pub struct ScriptLog {
    pub connects: usize,
    pub executed: Vec<Statement>,
    pub closed: usize,
}

/// Driver that replays scripted results keyed by statement SQL.
///
/// Statements without a script produce an empty result set. Clones share
/// one `ScriptLog`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    results: HashMap<String, ScriptedResult>,
    syntax: CallSyntax,
    fail_connect: bool,
    fail_close: bool,
    log: Arc<Mutex<ScriptLog>>,
}

impl ScriptedDriver {
    /// Create a driver with no scripted statements.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the result for a statement.
    #[must_use]
    pub fn on(mut self, sql: impl Into<String>, result: ScriptedResult) -> Self {
        self.results.insert(sql.into(), result);
        self
    }

    /// Use a different call spelling.
    #[must_use]
    pub fn with_call_syntax(mut self, syntax: CallSyntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Fail every connection attempt.
    #[must_use]
    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Fail every connection close.
    #[must_use]
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Snapshot of what the driver has seen so far.
    #[must_use]
    pub fn log(&self) -> ScriptLog {
        record(&self.log, |log| log.clone())
    }
}

fn record<R>(log: &Mutex<ScriptLog>, f: impl FnOnce(&mut ScriptLog) -> R) -> R {
    f(&mut log.lock().unwrap_or_else(PoisonError::into_inner))
}

#[async_trait]
impl RemoteDriver for ScriptedDriver {
    async fn connect(&self, target: &str) -> Result<Box<dyn RemoteConnection>, DriverError> {
        record(&self.log, |log| log.connects += 1);
        if self.fail_connect {
            return Err(DriverError::Connect(format!("scripted refusal for {target}")));
        }
        Ok(Box::new(ScriptedConnection {
            results: self.results.clone(),
            syntax: self.syntax,
            fail_close: self.fail_close,
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedConnection {
    results: HashMap<String, ScriptedResult>,
    syntax: CallSyntax,
    fail_close: bool,
    log: Arc<Mutex<ScriptLog>>,
}

fn rows_stream(rows: Vec<RawRow>) -> impl Stream<Item = Result<RawRow, DriverError>> + Send {
    stream::iter(rows.into_iter().map(Ok::<RawRow, DriverError>))
}

#[async_trait]
impl RemoteConnection for ScriptedConnection {
    fn call_syntax(&self) -> CallSyntax {
        self.syntax
    }

    async fn execute<'a>(
        &'a mut self,
        statement: &'a Statement,
    ) -> Result<RowStream<'a>, DriverError> {
        record(&self.log, |log| log.executed.push(statement.clone()));
        let result = self
            .results
            .get(&statement.sql)
            .cloned()
            .unwrap_or(ScriptedResult::Rows(Vec::new()));

        let sql = statement.sql.as_str();
        match result {
            ScriptedResult::Rows(rows) => Ok(rows_stream(rows).boxed()),
            ScriptedResult::Error(failure) => Err(failure.to_error(sql)),
            ScriptedResult::RowsThenError(rows, failure) => Ok(rows_stream(rows)
                .chain(stream::once(async move { Err(failure.to_error(sql)) }))
                .boxed()),
            ScriptedResult::RowsThenHang(rows) => {
                Ok(rows_stream(rows).chain(stream::pending()).boxed())
            }
            ScriptedResult::Hang => futures::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        record(&self.log, |log| log.closed += 1);
        if self.fail_close {
            return Err(DriverError::Query("scripted close failure".to_string()));
        }
        Ok(())
    }
}

/// Build a raw row from `(column, value)` pairs.
#[must_use]
pub fn raw_row(columns: &[(&str, Option<&str>)]) -> RawRow {
    columns
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.map(str::to_string)))
        .collect()
}
