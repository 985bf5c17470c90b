//! Result persistence.

use std::path::PathBuf;
use std::sync::Mutex;

use tracing::info;

use crate::error::{CrawlError, CrawlResult};
use crate::models::{Record, SearchCriteria};

/// Receives the final, deduplicated records of a crawl exactly once.
pub trait ResultSink: Send + Sync {
    /// Destination name for a search, e.g. a file name.
    fn destination_name(&self, criteria: &SearchCriteria) -> String;

    /// Persist `records`, returning where they went.
    fn write(&self, records: &[Record], destination: &str) -> CrawlResult<PathBuf>;
}

/// Replace characters that can't appear in a file name.
pub fn sanitize_file_component(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

fn sink_err(e: impl std::fmt::Display) -> CrawlError {
    CrawlError::Sink(e.to_string())
}

/// Writes one CSV spreadsheet per search city.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
    prefix: String,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }
}

impl ResultSink for CsvSink {
    fn destination_name(&self, criteria: &SearchCriteria) -> String {
        format!(
            "{}_in_{}_filtered.csv",
            sanitize_file_component(&self.prefix),
            sanitize_file_component(&criteria.city)
        )
    }

    fn write(&self, records: &[Record], destination: &str) -> CrawlResult<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(sink_err)?;
        let path = self.dir.join(destination);

        // Header row is written explicitly so empty results still get one
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(sink_err)?;
        writer
            .write_record(Record::COLUMNS)
            .map_err(sink_err)?;
        for record in records {
            writer.serialize(record).map_err(sink_err)?;
        }
        writer.flush().map_err(sink_err)?;

        info!("Wrote {} records to {}", records.len(), path.display());
        Ok(path)
    }
}

/// Keeps written batches in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    writes: Mutex<Vec<(String, Vec<Record>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(destination, records)` batch written so far.
    pub fn writes(&self) -> Vec<(String, Vec<Record>)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl ResultSink for MemorySink {
    fn destination_name(&self, criteria: &SearchCriteria) -> String {
        criteria.city.clone()
    }

    fn write(&self, records: &[Record], destination: &str) -> CrawlResult<PathBuf> {
        self.writes
            .lock()
            .map_err(|e| CrawlError::Sink(e.to_string()))?
            .push((destination.to_string(), records.to_vec()));
        Ok(PathBuf::from(destination))
    }
}
