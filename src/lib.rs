//! dircrawl - bidirectional crawler for paginated professional directories.
//!
//! Walks a directory's list pages from both ends at once, drills into each
//! entry's detail (and optional sub-detail) view, keeps entries that pass a
//! series of filter gates and writes the merged, deduplicated records to a
//! spreadsheet.

pub mod config;
pub mod crawler;
pub mod error;
pub mod models;
pub mod session;
pub mod sink;
pub mod status;

pub use error::{CrawlError, CrawlResult, SessionError};
