//! Command-line interface for dircrawl.

mod commands;
pub mod icons;
pub mod progress;

pub use commands::{is_verbose, run};
