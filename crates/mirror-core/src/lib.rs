//! Core abstractions for mirroring remote telemetry into a local store.
//!
//! This crate provides the fundamental building blocks:
//! - `RemoteSessionDescriptor` - What one remote session executes
//! - `RowRecord` / `RowBatch` / `RowMapper` - Normalized rows and their typed batches
//! - `SessionOutcome` / `FailureKind` - The terminal result of a session
//! - Driver and local store traits
//! - `MirrorConfig` - File + environment configuration

pub mod config;
pub mod descriptor;
pub mod row;
pub mod traits;

pub use config::{ConfigError, MirrorConfig};
pub use descriptor::{RemoteSessionDescriptor, SessionMode, SessionStep, StoredProcCall, TypedParam};
pub use row::{MapError, RowBatch, RowMapper, RowRecord};
pub use traits::{
    CallSyntax, DriverError, FailureKind, LocalStore, RawRow, RemoteConnection, RemoteDriver,
    RowStream, SessionOutcome, Statement, StoreError,
};
