//! Core traits for remote drivers and local storage.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::TypedParam;

/// Why a session did not complete.
///
/// The finer cause behind each kind is only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The connection could not be opened.
    Connection,
    /// A statement failed on the server or the connection dropped mid-step.
    Query,
    /// A call could not be built or a parameter could not be bound.
    InvalidParameter,
    /// A row could not be decoded or mapped.
    DataFormat,
}

/// Terminal result of one session. Exactly one per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "kind", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Every step ran and the channel was closed.
    Completed,
    /// The caller aborted the session.
    Cancelled,
    /// Anything else.
    Failed(FailureKind),
}

/// How a connection spells a stored-procedure call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallSyntax {
    /// ODBC/JDBC escape: `{call name (?, ?)}`.
    #[default]
    Escape,
    /// Plain SQL: `CALL name(?, ?)`.
    Call,
}

/// A statement ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// SQL text with one `?` per parameter.
    pub sql: String,
    /// Positional parameters.
    pub params: Vec<TypedParam>,
}

impl Statement {
    /// A plain query without parameters.
    #[must_use]
    pub fn query(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A prepared call with positional parameters.
    #[must_use]
    pub fn call(sql: impl Into<String>, params: Vec<TypedParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// One row as the driver delivers it: column name and nullable text value.
pub type RawRow = Vec<(String, Option<String>)>;

/// Rows of one result set, fetched lazily.
pub type RowStream<'a> = BoxStream<'a, Result<RawRow, DriverError>>;

/// Driver error.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Column decode failed: {0}")]
    Decode(String),
    #[error("Unsupported parameter: {0}")]
    UnsupportedParameter(String),
    #[error("Connection closed")]
    Closed,
}

/// Trait for remote relational drivers.
#[async_trait]
pub trait RemoteDriver: Send + Sync + 'static {
    /// Open one connection.
    async fn connect(&self, target: &str) -> Result<Box<dyn RemoteConnection>, DriverError>;
}

/// An open remote connection.
///
/// Dropping an in-flight `RowStream` abandons the result set.
#[async_trait]
pub trait RemoteConnection: Send {
    /// Call spelling understood by the server.
    fn call_syntax(&self) -> CallSyntax {
        CallSyntax::Escape
    }

    /// Execute a statement and stream its result set.
    async fn execute<'a>(
        &'a mut self,
        statement: &'a Statement,
    ) -> Result<RowStream<'a>, DriverError>;

    /// Release the connection.
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Local store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Row codec error: {0}")]
    Codec(String),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for the local row store.
///
/// Rows are addressed by insertion position. `count_rows` and `read_rows`
/// may run concurrently with `append_rows`; readers never see a partially
/// appended batch.
#[async_trait]
pub trait LocalStore<T: Send + 'static>: Send + Sync {
    /// Total number of rows.
    async fn count_rows(&self) -> Result<usize, StoreError>;

    /// Rows `[start, start + count)`; fewer (or none) past the end.
    async fn read_rows(&self, start: usize, count: usize) -> Result<Vec<T>, StoreError>;

    /// Append rows after the existing ones.
    async fn append_rows(&self, rows: Vec<T>) -> Result<(), StoreError>;
}
