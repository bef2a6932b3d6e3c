//! MySQL driver (feature-gated).

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::StreamExt;
use sqlx::{Column, Connection, MySqlConnection, Row, ValueRef, mysql::MySqlRow};
use telemetry_mirror_core::{
    CallSyntax, DriverError, RawRow, RemoteConnection, RemoteDriver, RowStream, Statement,
    TypedParam,
};

/// MySQL driver over a single `sqlx` connection per session.
///
/// Calls are spelled `CALL name(?, ?)` and run as prepared statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDriver;

#[async_trait]
impl RemoteDriver for MySqlDriver {
    async fn connect(&self, target: &str) -> Result<Box<dyn RemoteConnection>, DriverError> {
        let conn = MySqlConnection::connect(target)
            .await
            .map_err(|e| DriverError::Connect(e.to_string()))?;
        Ok(Box::new(MySqlRemote { conn: Some(conn) }))
    }
}

struct MySqlRemote {
    conn: Option<MySqlConnection>,
}

#[async_trait]
impl RemoteConnection for MySqlRemote {
    fn call_syntax(&self) -> CallSyntax {
        CallSyntax::Call
    }

    async fn execute<'a>(
        &'a mut self,
        statement: &'a Statement,
    ) -> Result<RowStream<'a>, DriverError> {
        let conn = self.conn.as_mut().ok_or(DriverError::Closed)?;

        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = match param {
                TypedParam::String(value) => query.bind(value.as_str()),
                TypedParam::Integer(value) => query.bind(*value),
                TypedParam::Timestamp(value) => query.bind(*value),
            };
        }

        Ok(query
            .fetch(conn)
            .map(|row| row.map_err(classify).and_then(|row| decode_row(&row)))
            .boxed())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if let Some(conn) = self.conn.take() {
            conn.close().await.map_err(classify)?;
        }
        Ok(())
    }
}

fn classify(err: sqlx::Error) -> DriverError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            DriverError::Decode(err.to_string())
        }
        sqlx::Error::Encode(_) | sqlx::Error::TypeNotFound { .. } => {
            DriverError::UnsupportedParameter(err.to_string())
        }
        other => DriverError::Query(other.to_string()),
    }
}

fn decode_row(row: &MySqlRow) -> Result<RawRow, DriverError> {
    row.columns()
        .iter()
        .map(|column| {
            let value = column_text(row, column.ordinal())?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}

// Columns arrive in the binary protocol, so each type is tried in turn and
// rendered as text. DECIMAL and other string-encoded types fall through to
// the unchecked string read.
fn column_text(row: &MySqlRow, index: usize) -> Result<Option<String>, DriverError> {
    let raw = row.try_get_raw(index).map_err(classify)?;
    if raw.is_null() {
        return Ok(None);
    }

    if let Ok(value) = row.try_get::<String, _>(index) {
        return Ok(Some(value));
    }
    if let Ok(value) = row.try_get::<i64, _>(index) {
        return Ok(Some(value.to_string()));
    }
    if let Ok(value) = row.try_get::<u64, _>(index) {
        return Ok(Some(value.to_string()));
    }
    if let Ok(value) = row.try_get::<f64, _>(index) {
        return Ok(Some(value.to_string()));
    }
    if let Ok(value) = row.try_get::<NaiveDateTime, _>(index) {
        return Ok(Some(value.format("%Y-%m-%d %H:%M:%S%.f").to_string()));
    }
    if let Ok(value) = row.try_get::<NaiveDate, _>(index) {
        return Ok(Some(value.to_string()));
    }
    if let Ok(value) = row.try_get::<NaiveTime, _>(index) {
        return Ok(Some(value.to_string()));
    }

    row.try_get_unchecked::<String, _>(index)
        .map(Some)
        .map_err(|e| DriverError::Decode(format!("column {index}: {e}")))
}
