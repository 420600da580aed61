//! Command-line interface for mistakebook.

mod commands;
mod helpers;

pub use commands::{is_verbose, run};
