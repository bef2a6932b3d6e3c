//! Streaming execution of remote query sessions.
//!
//! Provides:
//! - `StreamingSessionExecutor` - Run a session, stream batches, classify the outcome
//! - `CallBuilder` - Stored-procedure call text
//! - Drivers (scripted, MySQL behind the `mysql` feature)

pub mod call;
pub mod driver;
pub mod executor;

pub use call::{CallBuildError, CallBuilder};
pub use executor::{DEFAULT_CHANNEL_CAPACITY, SessionHandle, StreamingSessionExecutor};
