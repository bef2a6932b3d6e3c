//! Positional paging over the local telemetry store.
//!
//! A [`PositionalPageSource`] serves fixed windows by absolute position. The
//! [`PositionalPageSourceFactory`] hands out generation-numbered sources and
//! replaces them when the store changes.

pub mod factory;
pub mod source;
pub mod view;

pub use factory::PositionalPageSourceFactory;
pub use source::{
    InitialLoadParams, PageError, PositionalPageSource, PositionalWindow,
    compute_initial_load_position, compute_initial_load_size,
};
pub use view::PagedView;
