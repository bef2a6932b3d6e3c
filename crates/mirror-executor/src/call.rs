//! Stored-procedure call building.

use telemetry_mirror_core::{CallSyntax, Statement, StoredProcCall};
use thiserror::Error;

/// Call build error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallBuildError {
    #[error("Procedure name is empty")]
    EmptyName,
    #[error("Procedure name contains invalid characters: {0}")]
    InvalidName(String),
}

/// Builds a prepared call with one positional placeholder per parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallBuilder {
    syntax: CallSyntax,
}

impl CallBuilder {
    /// Create a builder for the given call spelling.
    #[must_use]
    pub const fn new(syntax: CallSyntax) -> Self {
        Self { syntax }
    }

    /// Build the statement for a call.
    ///
    /// # Errors
    /// Returns error if the procedure name is empty or not a plain identifier.
    pub fn build(&self, call: &StoredProcCall) -> Result<Statement, CallBuildError> {
        let name = validate_name(&call.name)?;
        let placeholders = vec!["?"; call.params.len()].join(", ");
        let sql = match self.syntax {
            CallSyntax::Escape => format!("{{call {name} ({placeholders})}}"),
            CallSyntax::Call => format!("CALL {name}({placeholders})"),
        };
        Ok(Statement::call(sql, call.params.clone()))
    }
}

// The name is spliced into SQL text, so only identifier characters pass.
fn validate_name(name: &str) -> Result<&str, CallBuildError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CallBuildError::EmptyName);
    }
    let valid = name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'));
    if valid {
        Ok(name)
    } else {
        Err(CallBuildError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use telemetry_mirror_core::TypedParam;

    use super::*;

    fn call(name: &str, n: usize) -> StoredProcCall {
        StoredProcCall::new(name, (0..n).map(|i| TypedParam::Integer(i as i32)).collect())
    }

    #[test]
    fn test_escape_syntax() {
        let stmt = CallBuilder::default().build(&call("GetArchiveData", 3)).unwrap();
        assert_eq!(stmt.sql, "{call GetArchiveData (?, ?, ?)}");
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn test_plain_call_syntax() {
        let stmt = CallBuilder::new(CallSyntax::Call)
            .build(&call("dbo.GetArchiveData", 1))
            .unwrap();
        assert_eq!(stmt.sql, "CALL dbo.GetArchiveData(?)");
    }

    #[test]
    fn test_no_parameters() {
        let stmt = CallBuilder::default().build(&call("[dbo].[Ping]", 0)).unwrap();
        assert_eq!(stmt.sql, "{call [dbo].[Ping] ()}");
    }

    #[test]
    fn test_rejects_bad_names() {
        assert_eq!(
            CallBuilder::default().build(&call("  ", 1)),
            Err(CallBuildError::EmptyName)
        );
        assert_eq!(
            CallBuilder::default().build(&call("P; DROP TABLE x", 1)),
            Err(CallBuildError::InvalidName("P; DROP TABLE x".into()))
        );
    }
}
