//! Driver implementations.

pub mod scripted;

#[cfg(feature = "mysql")]
pub mod mysql;

pub use scripted::{ScriptLog, ScriptedDriver, ScriptedFailure, ScriptedResult, raw_row};

#[cfg(feature = "mysql")]
pub use mysql::MySqlDriver;
