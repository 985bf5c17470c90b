//! Crawl engine: pagination, per-entry filtering, directional workers and
//! the two-direction coordinator.

mod coordinator;
mod pagination;
mod pipeline;
mod worker;

pub use coordinator::{dedup_records, CrawlCoordinator, CrawlReport};
pub use pagination::PaginationEngine;
pub use pipeline::{Evaluation, LocationFields, RecordFilterPipeline, Rejection, Verdict, ViewDepth};
pub use worker::{CrawlWorker, WorkerContext, WorkerState};

use std::time::Duration;

use crate::config::CrawlSettings;

/// Wait bounds and settle delays applied around UI-affecting actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Pause after scrolls, clicks and returns to a list view.
    pub settle: Duration,
    /// Bound on each wait-for-element step.
    pub wait_timeout: Duration,
}

impl Pacing {
    pub fn new(settle: Duration, wait_timeout: Duration) -> Self {
        Self {
            settle,
            wait_timeout,
        }
    }

    /// No settle delays; for in-memory sessions.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::from_secs(1))
    }

    pub async fn settle(&self) {
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
    }
}

impl From<&CrawlSettings> for Pacing {
    fn from(settings: &CrawlSettings) -> Self {
        Self::new(settings.settle_delay(), settings.wait_timeout())
    }
}
