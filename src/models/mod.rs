//! Data model for directory crawls.

mod criteria;
mod record;

pub use criteria::{QuotaSplit, SearchCriteria};
pub use record::Record;

use serde::{Deserialize, Serialize};

/// Traversal direction of one crawl worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// From the first result page towards the last.
    Forward,
    /// From the last result page towards the first.
    Backward,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable traversal position of one pagination engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub direction: Direction,
    pub has_more: bool,
    /// Visible entries seen on the most recently read page.
    pub last_page_entry_count: usize,
    /// Pages stepped through so far (the seek to the last page is not counted).
    pub pages_advanced: usize,
}

impl PageCursor {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            has_more: true,
            last_page_entry_count: 0,
            pages_advanced: 0,
        }
    }
}

/// Why a worker reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    QuotaReached,
    Exhausted,
    Failed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::QuotaReached => write!(f, "quota reached"),
            StopReason::Exhausted => write!(f, "no more results"),
            StopReason::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one directional crawl. Records are in discovery order.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub direction: Direction,
    pub records: Vec<Record>,
    /// Last count reported to progress observers.
    pub reported: usize,
    pub pages_read: usize,
    pub stop: StopReason,
    /// Failure that ended the crawl early, if any. Records collected before
    /// the failure are still in `records`.
    pub error: Option<String>,
}

impl CrawlOutcome {
    /// Outcome of a worker that never got a usable session.
    pub fn failed(direction: Direction, error: impl Into<String>) -> Self {
        Self {
            direction,
            records: Vec::new(),
            reported: 0,
            pages_read: 0,
            stop: StopReason::Failed,
            error: Some(error.into()),
        }
    }
}

/// Aggregated progress of a coordinated crawl.
///
/// `total()` is the sum of both workers' last-reported counts taken before
/// deduplication, so it can exceed the number of unique records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub forward: usize,
    pub backward: usize,
    pub quota: usize,
}

impl ProgressSnapshot {
    pub fn total(&self) -> usize {
        self.forward + self.backward
    }

    /// Completion fraction, clamped to `1.0`.
    pub fn fraction(&self) -> f64 {
        if self.quota == 0 {
            return 1.0;
        }
        (self.total() as f64 / self.quota as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Forward.to_string(), "forward");
        assert_eq!(Direction::Backward.to_string(), "backward");
    }

    #[test]
    fn test_progress_fraction_is_clamped() {
        let snapshot = ProgressSnapshot {
            forward: 6,
            backward: 7,
            quota: 10,
        };
        assert_eq!(snapshot.total(), 13);
        assert_eq!(snapshot.fraction(), 1.0);

        let partial = ProgressSnapshot {
            forward: 2,
            backward: 3,
            quota: 10,
        };
        assert!((partial.fraction() - 0.5).abs() < f64::EPSILON);
    }
}
