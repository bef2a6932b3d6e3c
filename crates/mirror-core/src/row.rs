//! Normalized rows, typed batches and the row mapping contract.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One result-set row keyed by column name.
///
/// Every value is text; SQL `NULL` is normalized to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRecord {
    columns: HashMap<String, String>,
}

impl RowRecord {
    /// Build a record from driver columns, normalizing nulls.
    ///
    /// A repeated column name keeps the last value.
    #[must_use]
    pub fn from_columns<I>(columns: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, value)| (name, value.unwrap_or_default()))
                .collect(),
        }
    }

    /// Get a column value.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    /// Get a column value, failing if the column is absent.
    ///
    /// # Errors
    /// Returns `MapError::MissingColumn` if the row has no such column.
    pub fn require(&self, column: &str) -> Result<&str, MapError> {
        self.get(column)
            .ok_or_else(|| MapError::MissingColumn(column.to_string()))
    }

    /// Parse a column as an integer.
    ///
    /// # Errors
    /// Returns error if the column is absent or not an integer.
    pub fn require_i64(&self, column: &str) -> Result<i64, MapError> {
        let value = self.require(column)?;
        value
            .trim()
            .parse()
            .map_err(|_| MapError::InvalidValue {
                column: column.to_string(),
                value: value.to_string(),
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Row mapping error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("Missing column: {0}")]
    MissingColumn(String),
    #[error("Invalid value {value:?} in column {column}")]
    InvalidValue { column: String, value: String },
}

/// Converts a normalized row into a typed record.
///
/// Implemented for any `Fn(&RowRecord) -> Result<T, MapError>`.
pub trait RowMapper<T>: Send + Sync {
    /// Map one row.
    ///
    /// # Errors
    /// Returns error if the row does not have the expected shape.
    fn map_row(&self, row: &RowRecord) -> Result<T, MapError>;
}

impl<T, F> RowMapper<T> for F
where
    F: Fn(&RowRecord) -> Result<T, MapError> + Send + Sync,
{
    fn map_row(&self, row: &RowRecord) -> Result<T, MapError> {
        self(row)
    }
}

/// The full, non-empty output of one session step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBatch<T> {
    step: usize,
    rows: Vec<T>,
}

impl<T> RowBatch<T> {
    /// Wrap the rows produced by `step` (0-based).
    ///
    /// Returns `None` for an empty row set: empty batches are never emitted.
    #[must_use]
    pub fn new(step: usize, rows: Vec<T>) -> Option<Self> {
        (!rows.is_empty()).then_some(Self { step, rows })
    }

    /// Index of the step that produced this batch.
    #[must_use]
    pub const fn step(&self) -> usize {
        self.step
    }

    #[must_use]
    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Always false for a built batch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }
}
