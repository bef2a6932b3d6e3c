//! Description of one remote session.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A typed stored-procedure argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedParam {
    /// Bound as a national character string.
    String(String),
    /// Bound as a 32-bit integer.
    Integer(i32),
    /// Bound as a timestamp without zone.
    Timestamp(NaiveDateTime),
}

impl TypedParam {
    /// Short tag name, used in step logs.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Timestamp(_) => "timestamp",
        }
    }
}

/// One stored-procedure call with its positional arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProcCall {
    /// Procedure name, optionally schema-qualified.
    pub name: String,
    /// Arguments in declaration order.
    #[serde(default)]
    pub params: Vec<TypedParam>,
}

impl StoredProcCall {
    /// Create a call.
    #[must_use]
    pub fn new(name: impl Into<String>, params: Vec<TypedParam>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Which kind of steps a descriptor carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    PlainQueries,
    StoredProcedures,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "steps", rename_all = "snake_case")]
enum Steps {
    PlainQueries(Vec<String>),
    StoredProcedures(Vec<StoredProcCall>),
}

/// A single step, borrowed from its descriptor.
#[derive(Debug, Clone, Copy)]
pub enum SessionStep<'a> {
    Query(&'a str),
    Call(&'a StoredProcCall),
}

/// Immutable description of one remote session.
///
/// A descriptor carries either plain queries or stored-procedure calls,
/// never both. Steps run in order against a single connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSessionDescriptor {
    connection_target: String,
    steps: Steps,
}

impl RemoteSessionDescriptor {
    /// Create a session that runs plain query strings.
    #[must_use]
    pub fn plain_queries<I, S>(connection_target: impl Into<String>, queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            connection_target: connection_target.into(),
            steps: Steps::PlainQueries(queries.into_iter().map(Into::into).collect()),
        }
    }

    /// Create a session that runs stored-procedure calls.
    #[must_use]
    pub fn stored_procedures(
        connection_target: impl Into<String>,
        calls: impl IntoIterator<Item = StoredProcCall>,
    ) -> Self {
        Self {
            connection_target: connection_target.into(),
            steps: Steps::StoredProcedures(calls.into_iter().collect()),
        }
    }

    /// Connection string or URI handed to the driver.
    #[must_use]
    pub fn connection_target(&self) -> &str {
        &self.connection_target
    }

    #[must_use]
    pub const fn mode(&self) -> SessionMode {
        match self.steps {
            Steps::PlainQueries(_) => SessionMode::PlainQueries,
            Steps::StoredProcedures(_) => SessionMode::StoredProcedures,
        }
    }

    /// Number of steps in the session.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.steps {
            Steps::PlainQueries(q) => q.len(),
            Steps::StoredProcedures(c) => c.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the steps in execution order.
    pub fn steps(&self) -> impl Iterator<Item = SessionStep<'_>> + '_ {
        let (queries, calls): (&[String], &[StoredProcCall]) = match &self.steps {
            Steps::PlainQueries(q) => (q.as_slice(), &[]),
            Steps::StoredProcedures(c) => (&[], c.as_slice()),
        };
        queries
            .iter()
            .map(|q| SessionStep::Query(q.as_str()))
            .chain(calls.iter().map(SessionStep::Call))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_plain_query_session() {
        let d = RemoteSessionDescriptor::plain_queries("mysql://db", ["SELECT 1", "SELECT 2"]);
        assert_eq!(d.mode(), SessionMode::PlainQueries);
        assert_eq!(d.len(), 2);
        let steps: Vec<_> = d
            .steps()
            .map(|s| match s {
                SessionStep::Query(q) => q.to_string(),
                SessionStep::Call(_) => panic!("unexpected call"),
            })
            .collect();
        assert_eq!(steps, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_stored_procedure_session() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let d = RemoteSessionDescriptor::stored_procedures(
            "mysql://db",
            [StoredProcCall::new(
                "GetArchiveData",
                vec![TypedParam::Integer(7), TypedParam::Timestamp(ts)],
            )],
        );
        assert_eq!(d.mode(), SessionMode::StoredProcedures);
        assert_eq!(d.connection_target(), "mysql://db");
        match d.steps().next() {
            Some(SessionStep::Call(call)) => {
                assert_eq!(call.name, "GetArchiveData");
                assert_eq!(call.params[0].tag(), "integer");
                assert_eq!(call.params[1].tag(), "timestamp");
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_descriptor_serialization_is_tagged() {
        let d = RemoteSessionDescriptor::stored_procedures(
            "mysql://db",
            [StoredProcCall::new("P", vec![TypedParam::String("x".into())])],
        );
        let text = serde_json::to_string(&d).unwrap();
        assert!(text.contains(r#""mode":"stored_procedures""#));

        let parsed: RemoteSessionDescriptor = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, d);
    }
}
