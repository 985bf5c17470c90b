//! Status and progress reporting for running crawls.
//!
//! Workers emit human-readable status lines as they happen and a running
//! record count after every page. Both flow into a [`CrawlObserver`]; the
//! CLI renders them, tests collect them through a channel.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::models::{Direction, ProgressSnapshot};

/// Event delivered to channel-based observers.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    Status {
        direction: Option<Direction>,
        message: String,
    },
    Progress(ProgressSnapshot),
    /// Both workers are done; `unique` is the deduplicated record count.
    Finished { unique: usize },
}

/// Receives status lines and progress from a crawl.
///
/// Callbacks may arrive concurrently from both workers.
pub trait CrawlObserver: Send + Sync {
    fn on_status(&self, direction: Option<Direction>, message: &str);

    fn on_progress(&self, _snapshot: ProgressSnapshot) {}

    fn on_finished(&self, _unique: usize) {}
}

/// Observer that only logs. Status lines are already traced by
/// [`StatusReporter`], so this adds progress at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CrawlObserver for TracingObserver {
    fn on_status(&self, _direction: Option<Direction>, _message: &str) {}

    fn on_progress(&self, snapshot: ProgressSnapshot) {
        debug!(
            forward = snapshot.forward,
            backward = snapshot.backward,
            "Progress {}/{}",
            snapshot.total(),
            snapshot.quota
        );
    }

    fn on_finished(&self, unique: usize) {
        info!("Crawl finished with {} unique records", unique);
    }
}

impl CrawlObserver for mpsc::UnboundedSender<CrawlEvent> {
    fn on_status(&self, direction: Option<Direction>, message: &str) {
        let _ = self.send(CrawlEvent::Status {
            direction,
            message: message.to_string(),
        });
    }

    fn on_progress(&self, snapshot: ProgressSnapshot) {
        let _ = self.send(CrawlEvent::Progress(snapshot));
    }

    fn on_finished(&self, unique: usize) {
        let _ = self.send(CrawlEvent::Finished { unique });
    }
}

/// Status line emitter bound to one worker.
#[derive(Clone)]
pub struct StatusReporter {
    direction: Option<Direction>,
    observer: Arc<dyn CrawlObserver>,
}

impl StatusReporter {
    pub fn new(direction: Option<Direction>, observer: Arc<dyn CrawlObserver>) -> Self {
        Self {
            direction,
            observer,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    /// Append a line to the status log.
    pub fn report(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        match self.direction {
            Some(direction) => info!(direction = %direction, "{}", message),
            None => info!("{}", message),
        }
        self.observer.on_status(self.direction, message);
    }
}

/// Last-reported count per direction, shared by both workers.
///
/// Counts only grow per direction, and the update plus notification happen
/// under one lock, so observers never see the aggregate move backwards.
pub struct ProgressTally {
    counts: Mutex<ProgressSnapshot>,
    observer: Arc<dyn CrawlObserver>,
}

impl ProgressTally {
    pub fn new(quota: usize, observer: Arc<dyn CrawlObserver>) -> Self {
        Self {
            counts: Mutex::new(ProgressSnapshot {
                forward: 0,
                backward: 0,
                quota,
            }),
            observer,
        }
    }

    /// Record a worker's running count and notify the observer.
    pub fn report(&self, direction: Direction, count: usize) -> ProgressSnapshot {
        let mut counts = self
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let slot = match direction {
            Direction::Forward => &mut counts.forward,
            Direction::Backward => &mut counts.backward,
        };
        *slot = (*slot).max(count);
        let snapshot = *counts;
        self.observer.on_progress(snapshot);
        snapshot
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *self
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn finish(&self, unique: usize) {
        self.observer.on_finished(unique);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_is_monotonic_per_direction() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tally = ProgressTally::new(10, Arc::new(tx));

        tally.report(Direction::Forward, 3);
        tally.report(Direction::Backward, 4);
        let snapshot = tally.report(Direction::Forward, 2);
        assert_eq!(snapshot.forward, 3);
        assert_eq!(snapshot.total(), 7);

        let mut totals = Vec::new();
        while let Ok(CrawlEvent::Progress(s)) = rx.try_recv() {
            totals.push(s.total());
        }
        assert_eq!(totals, vec![3, 7, 7]);
    }

    /// Records totals and stalls on the first one so a second report races it.
    struct SlowObserver {
        seen: Mutex<Vec<usize>>,
    }

    impl CrawlObserver for SlowObserver {
        fn on_status(&self, _direction: Option<Direction>, _message: &str) {}

        fn on_progress(&self, snapshot: ProgressSnapshot) {
            if snapshot.total() == 3 {
                std::thread::sleep(std::time::Duration::from_millis(200));
            }
            self.seen.lock().unwrap().push(snapshot.total());
        }
    }

    #[test]
    fn test_concurrent_reports_reach_observer_in_order() {
        let observer = Arc::new(SlowObserver {
            seen: Mutex::new(Vec::new()),
        });
        let tally = Arc::new(ProgressTally::new(10, observer.clone()));

        let first = {
            let tally = tally.clone();
            std::thread::spawn(move || tally.report(Direction::Forward, 3))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        let second = {
            let tally = tally.clone();
            std::thread::spawn(move || tally.report(Direction::Backward, 4))
        };
        first.join().unwrap();
        second.join().unwrap();

        let seen = observer.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![3, 7]);
    }

    #[test]
    fn test_reporter_forwards_direction() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = StatusReporter::new(Some(Direction::Backward), Arc::new(tx));
        reporter.report("Scrolling to the bottom of the page");

        assert_eq!(
            rx.try_recv().unwrap(),
            CrawlEvent::Status {
                direction: Some(Direction::Backward),
                message: "Scrolling to the bottom of the page".to_string(),
            }
        );
    }
}
