//! Refresh orchestration and local storage for mirrored telemetry.
//!
//! Provides:
//! - `RefreshOrchestrator` - Run an archive session and ingest it
//! - Archive/catalog descriptors and row mappers
//! - Storage implementations (memory, SQLite)

pub mod archive;
pub mod orchestrator;
pub mod sample;
pub mod storage;

pub use archive::{TimeRange, archive_descriptor, catalog_descriptor};
pub use orchestrator::{RefreshError, RefreshOrchestrator, RefreshOutcome, RefreshReport};
pub use sample::{DeviceInfo, ParameterInfo, TelemetrySample};
