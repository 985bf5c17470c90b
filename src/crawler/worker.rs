//! One directional crawl as an explicit state machine.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{PaginationEngine, Pacing, RecordFilterPipeline};
use crate::config::SiteProfile;
use crate::error::CrawlResult;
use crate::models::{CrawlOutcome, Direction, Record, SearchCriteria, StopReason};
use crate::session::BrowsingSession;
use crate::status::{CrawlObserver, ProgressTally, StatusReporter};

/// Worker lifecycle.
///
/// `Init -> ListLoaded -> (ProcessingPage -> PageExhaustedCheck -> Advancing)* -> Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Init,
    ListLoaded,
    ProcessingPage,
    PageExhaustedCheck,
    Advancing,
    Done,
}

/// Everything a worker shares with its sibling.
#[derive(Clone)]
pub struct WorkerContext {
    pub profile: Arc<SiteProfile>,
    pub criteria: Arc<SearchCriteria>,
    pub pacing: Pacing,
    pub batch_size: usize,
    pub observer: Arc<dyn CrawlObserver>,
    pub progress: Arc<ProgressTally>,
}

impl WorkerContext {
    pub fn status(&self, direction: Direction) -> StatusReporter {
        StatusReporter::new(Some(direction), self.observer.clone())
    }
}

/// Crawls list pages in one direction until its quota or the directory runs out.
///
/// Owns its session and closes it when done, whatever the outcome.
pub struct CrawlWorker<S: BrowsingSession> {
    direction: Direction,
    quota: usize,
    session: S,
    engine: PaginationEngine,
    pipeline: RecordFilterPipeline,
    criteria: Arc<SearchCriteria>,
    list_url: String,
    status: StatusReporter,
    progress: Arc<ProgressTally>,
    state: WorkerState,
    records: Vec<Record>,
    pages_read: usize,
}

impl<S: BrowsingSession> CrawlWorker<S> {
    pub fn new(direction: Direction, quota: usize, session: S, ctx: &WorkerContext) -> Self {
        Self {
            direction,
            quota,
            session,
            engine: PaginationEngine::new(
                direction,
                ctx.profile.clone(),
                ctx.pacing,
                ctx.batch_size,
            ),
            pipeline: RecordFilterPipeline::new(ctx.profile.clone(), ctx.pacing),
            criteria: ctx.criteria.clone(),
            list_url: ctx.profile.list_url_for(&ctx.criteria.city),
            status: ctx.status(direction),
            progress: ctx.progress.clone(),
            state: WorkerState::Init,
            records: Vec::new(),
            pages_read: 0,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Run to a terminal state and release the session.
    ///
    /// A failure ends the crawl but keeps the records collected before it.
    pub async fn run(mut self) -> CrawlOutcome {
        let result = self.drive().await;
        self.state = WorkerState::Done;

        if let Err(e) = self.session.close().await {
            debug!("{} session close failed: {}", self.direction, e);
        }

        let (stop, error) = match result {
            Ok(stop) => (stop, None),
            Err(e) => {
                warn!("{} crawl failed: {}", self.direction, e);
                self.status.report(format!(
                    "Crawl stopped early: {} ({} records kept)",
                    e,
                    self.records.len()
                ));
                (StopReason::Failed, Some(e.to_string()))
            }
        };
        self.status.report(format!(
            "Finished {} crawl: {} records from {} page(s), {}",
            self.direction,
            self.records.len(),
            self.pages_read,
            stop
        ));

        CrawlOutcome {
            direction: self.direction,
            reported: self.records.len(),
            records: self.records,
            pages_read: self.pages_read,
            stop,
            error,
        }
    }

    async fn drive(&mut self) -> CrawlResult<StopReason> {
        let mut stop = StopReason::Exhausted;
        loop {
            debug!(direction = %self.direction, state = ?self.state, "worker step");
            self.state = match self.state {
                WorkerState::Init => {
                    if self.quota == 0 {
                        self.status.report("Nothing to collect in this direction.");
                        stop = StopReason::QuotaReached;
                        WorkerState::Done
                    } else {
                        self.engine
                            .open_list(&mut self.session, &self.list_url, &self.status)
                            .await?;
                        if self.direction == Direction::Backward {
                            self.engine
                                .seek_to_last(&mut self.session, &self.status)
                                .await?;
                        }
                        WorkerState::ListLoaded
                    }
                }
                WorkerState::ListLoaded => WorkerState::ProcessingPage,
                WorkerState::ProcessingPage => {
                    let had_entries = self.process_page().await?;
                    self.pages_read += 1;
                    self.progress.report(self.direction, self.records.len());
                    if had_entries {
                        WorkerState::PageExhaustedCheck
                    } else {
                        stop = StopReason::Exhausted;
                        WorkerState::Done
                    }
                }
                WorkerState::PageExhaustedCheck => {
                    if self.records.len() >= self.quota {
                        stop = StopReason::QuotaReached;
                        WorkerState::Done
                    } else {
                        WorkerState::Advancing
                    }
                }
                WorkerState::Advancing => {
                    if self
                        .engine
                        .advance(&mut self.session, &self.status)
                        .await?
                    {
                        WorkerState::ProcessingPage
                    } else {
                        stop = StopReason::Exhausted;
                        WorkerState::Done
                    }
                }
                WorkerState::Done => return Ok(stop),
            };
        }
    }

    /// Evaluate the current page's batch. Returns `false` for an empty page.
    async fn process_page(&mut self) -> CrawlResult<bool> {
        let batch = self
            .engine
            .current_entries(&mut self.session, &self.status)
            .await?
            .len();
        if batch == 0 {
            self.status.report("No visible search results found.");
            return Ok(false);
        }

        for index in 0..batch {
            if self.records.len() >= self.quota {
                break;
            }

            let Some(entry) = self.engine.entry_at(&mut self.session, index).await? else {
                warn!(
                    "{} page shrank to {} entries while processing",
                    self.direction, index
                );
                break;
            };

            let eval = self
                .pipeline
                .evaluate(&mut self.session, &entry, &self.criteria, &self.status)
                .await;
            let depth = eval.depth;

            // An accepted entry contributes all of its locations; the
            // quota is only checked between entries
            self.records.extend(eval.into_records());

            // Every entry must end with the list view showing again
            self.pipeline
                .return_to_list(&mut self.session, depth)
                .await?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::memory::{Listing, Location, MemoryDirectory, MemorySession};
    use crate::status::TracingObserver;

    fn oakville(name: &str) -> Listing {
        Listing::new(name).with_location(Location::new(
            Some("Clinic"),
            &["1 Main St", "Oakville, ON", "L6J 1A1"],
        ))
    }

    fn context(quota: usize) -> WorkerContext {
        let observer: Arc<dyn CrawlObserver> = Arc::new(TracingObserver);
        WorkerContext {
            profile: Arc::new(SiteProfile::default()),
            criteria: Arc::new(SearchCriteria::new("Oakville", "IV", quota as i64).unwrap()),
            pacing: Pacing::immediate(),
            batch_size: 10,
            observer: observer.clone(),
            progress: Arc::new(ProgressTally::new(quota, observer)),
        }
    }

    fn worker(
        direction: Direction,
        quota: usize,
        directory: MemoryDirectory,
    ) -> (CrawlWorker<MemorySession>, crate::session::memory::ActionLog) {
        let ctx = context(quota.max(1));
        let session = MemorySession::new(Arc::new(directory), ctx.profile.clone());
        let log = session.action_log();
        (CrawlWorker::new(direction, quota, session, &ctx), log)
    }

    #[tokio::test]
    async fn test_stops_mid_batch_at_quota() {
        let page = (0..5).map(|i| oakville(&format!("Dr. {}", i))).collect();
        let (worker, log) = worker(Direction::Forward, 2, MemoryDirectory::new(vec![page]));
        let outcome = worker.run().await;

        assert_eq!(outcome.stop, StopReason::QuotaReached);
        assert_eq!(outcome.records.len(), 2);
        let entered = log
            .lock()
            .unwrap()
            .iter()
            .filter(|a| matches!(a, crate::session::memory::SessionAction::Click(l) if l.starts_with("entry:")))
            .count();
        assert_eq!(entered, 2);
    }

    #[tokio::test]
    async fn test_quota_keeps_every_location_of_last_entry() {
        let multi = Listing::new("Dr. Multi")
            .with_location(Location::new(Some("One"), &["1 St", "Oakville, ON", "L6J 1A1"]))
            .with_location(Location::new(Some("Two"), &["2 St", "Oakville, ON", "L6J 2B2"]))
            .with_location(Location::new(Some("Three"), &["3 St", "Oakville, ON", "L6J 3C3"]));
        let directory = MemoryDirectory::new(vec![vec![multi, oakville("Dr. Single")]]);
        let (worker, _) = worker(Direction::Forward, 2, directory);
        let outcome = worker.run().await;

        assert_eq!(outcome.stop, StopReason::QuotaReached);
        let addresses: Vec<_> = outcome.records.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addresses, vec!["1 St", "2 St", "3 St"]);
    }

    #[tokio::test]
    async fn test_zero_quota_goes_straight_to_done() {
        let (worker, log) = worker(
            Direction::Forward,
            0,
            MemoryDirectory::new(vec![vec![oakville("Dr. A")]]),
        );
        let outcome = worker.run().await;
        assert_eq!(outcome.stop, StopReason::QuotaReached);
        assert!(outcome.records.is_empty());
        assert_eq!(
            *log.lock().unwrap(),
            vec![crate::session::memory::SessionAction::Close]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_after_last_page() {
        let directory = MemoryDirectory::new(vec![
            vec![oakville("Dr. A")],
            vec![oakville("Dr. B")],
        ]);
        let (worker, _) = worker(Direction::Forward, 10, directory);
        let outcome = worker.run().await;

        assert_eq!(outcome.stop, StopReason::Exhausted);
        assert_eq!(outcome.pages_read, 2);
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_empty_page_ends_crawl() {
        let directory = MemoryDirectory::new(vec![
            vec![Listing::new("Hidden").hidden()],
            vec![oakville("Dr. B")],
        ]);
        let (worker, _) = worker(Direction::Forward, 10, directory);
        let outcome = worker.run().await;
        assert_eq!(outcome.stop, StopReason::Exhausted);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.pages_read, 1);
    }

    #[tokio::test]
    async fn test_navigation_failure_keeps_partial_records() {
        let directory = MemoryDirectory::new(vec![vec![
            oakville("Dr. A"),
            oakville("Dr. B").stalling_on_return(),
            oakville("Dr. C"),
        ]]);
        let (worker, log) = worker(Direction::Forward, 10, directory);
        let outcome = worker.run().await;

        assert_eq!(outcome.stop, StopReason::Failed);
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.error.unwrap().contains("Navigation timeout"));
        assert_eq!(
            log.lock().unwrap().last(),
            Some(&crate::session::memory::SessionAction::Close)
        );
    }
}
