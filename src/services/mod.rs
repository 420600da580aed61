//! Service layer for mistakebook.
//!
//! Domain logic separated from UI concerns; the CLI drives these services
//! and renders their events.

pub mod batch;

pub use batch::{BatchEvent, BatchOptions, BatchQueue, BatchReport};
