//! Two-direction crawl: forward and backward workers, merged once both finish.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{CrawlWorker, Pacing, WorkerContext};
use crate::config::{CrawlSettings, SiteProfile};
use crate::error::{CrawlError, CrawlResult};
use crate::models::{CrawlOutcome, Direction, Record, SearchCriteria};
use crate::session::SessionFactory;
use crate::sink::ResultSink;
use crate::status::{CrawlObserver, ProgressTally, StatusReporter, TracingObserver};

/// Drop repeated records, keeping the first occurrence of each.
pub fn dedup_records(records: impl IntoIterator<Item = Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.clone()))
        .collect()
}

/// Merged result of a coordinated crawl.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// Deduplicated records, at most the requested quota.
    pub records: Vec<Record>,
    /// Per-worker outcomes in completion order.
    pub outcomes: Vec<CrawlOutcome>,
    /// Records collected by both workers before deduplication.
    pub collected: usize,
    pub quota: usize,
}

impl CrawlReport {
    /// Whether any worker ended on a failure.
    pub fn is_partial(&self) -> bool {
        self.outcomes.iter().any(|o| o.error.is_some())
    }

    pub fn errors(&self) -> Vec<(Direction, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_deref().map(|e| (o.direction, e)))
            .collect()
    }

    pub fn outcome(&self, direction: Direction) -> Option<&CrawlOutcome> {
        self.outcomes.iter().find(|o| o.direction == direction)
    }
}

/// Runs a forward and a backward worker concurrently, each with its own session.
pub struct CrawlCoordinator<F: SessionFactory> {
    factory: Arc<F>,
    profile: Arc<SiteProfile>,
    settings: CrawlSettings,
    pacing: Pacing,
    observer: Arc<dyn CrawlObserver>,
}

impl<F: SessionFactory + 'static> CrawlCoordinator<F> {
    pub fn new(factory: F, profile: SiteProfile, settings: CrawlSettings) -> Self {
        let pacing = Pacing::from(&settings);
        Self {
            factory: Arc::new(factory),
            profile: Arc::new(profile),
            settings,
            pacing,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CrawlObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Override the pacing derived from the settings.
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Crawl both directions and merge the results.
    ///
    /// Records are concatenated in worker completion order, deduplicated and
    /// truncated to the quota. Failed workers contribute what they collected.
    pub async fn run(&self, criteria: SearchCriteria) -> CrawlReport {
        let quota = criteria.quota;
        let per_direction = self.settings.quota_split.per_direction(quota);
        let status = StatusReporter::new(None, self.observer.clone());
        status.report(format!(
            "Crawl started: {} records wanted in {} ({} per direction)",
            quota, criteria.city, per_direction
        ));

        let progress = Arc::new(ProgressTally::new(quota, self.observer.clone()));
        let ctx = WorkerContext {
            profile: self.profile.clone(),
            criteria: Arc::new(criteria),
            pacing: self.pacing,
            batch_size: self.settings.page_batch_size,
            observer: self.observer.clone(),
            progress: progress.clone(),
        };

        let mut set = JoinSet::new();
        for direction in [Direction::Forward, Direction::Backward] {
            let factory = self.factory.clone();
            let ctx = ctx.clone();
            set.spawn(async move {
                match factory.create(direction).await {
                    Ok(session) => {
                        CrawlWorker::new(direction, per_direction, session, &ctx)
                            .run()
                            .await
                    }
                    Err(e) => {
                        let err = CrawlError::from(e);
                        ctx.status(direction)
                            .report(format!("Could not start {} crawl: {}", direction, err));
                        CrawlOutcome::failed(direction, err.to_string())
                    }
                }
            });
        }

        let mut outcomes: Vec<CrawlOutcome> = Vec::with_capacity(2);
        let mut join_errors = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    warn!("Crawl worker task failed: {}", err);
                    join_errors.push(err.to_string());
                }
            }
        }
        for direction in [Direction::Forward, Direction::Backward] {
            if !outcomes.iter().any(|o| o.direction == direction) {
                let reason = join_errors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "worker task did not complete".to_string());
                outcomes.push(CrawlOutcome::failed(
                    direction,
                    format!("worker task failed: {}", reason),
                ));
            }
        }

        let collected: usize = outcomes.iter().map(|o| o.records.len()).sum();
        let mut records = dedup_records(outcomes.iter().flat_map(|o| o.records.iter().cloned()));
        records.truncate(quota);

        info!(
            "Merged {} collected records into {} unique",
            collected,
            records.len()
        );
        status.report(format!(
            "Crawl complete: {} records collected, {} unique",
            collected,
            records.len()
        ));
        progress.finish(records.len());

        CrawlReport {
            records,
            outcomes,
            collected,
            quota,
        }
    }

    /// Crawl and hand the merged records to `sink` exactly once.
    ///
    /// Partial results from failed workers are still written. The report is
    /// returned even when the sink fails, so the records stay available.
    pub async fn run_to_sink<K: ResultSink + ?Sized>(
        &self,
        criteria: SearchCriteria,
        sink: &K,
    ) -> (CrawlReport, CrawlResult<PathBuf>) {
        let destination = sink.destination_name(&criteria);
        let report = self.run(criteria).await;
        let status = StatusReporter::new(None, self.observer.clone());
        let written = sink.write(&report.records, &destination);
        match &written {
            Ok(path) => status.report(format!("Data saved to {}", path.display())),
            Err(e) => {
                warn!("Saving {} records failed: {}", report.records.len(), e);
                status.report(format!("Error saving data: {}", e));
            }
        }
        (report, written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(name: &str, address: &str) -> Record {
        Record::new(name, "Clinic", address, "Oakville ON L6J 1A1")
    }

    #[test]
    fn test_dedup_preserves_first_seen_order() {
        let merged = dedup_records(vec![
            r("B", "1"),
            r("A", "1"),
            r("B", "1"),
            r("C", "2"),
            r("A", "1"),
        ]);
        assert_eq!(merged, vec![r("B", "1"), r("A", "1"), r("C", "2")]);
    }

    struct BrokenSink;

    impl ResultSink for BrokenSink {
        fn destination_name(&self, criteria: &SearchCriteria) -> String {
            criteria.city.clone()
        }

        fn write(&self, _records: &[Record], _destination: &str) -> CrawlResult<PathBuf> {
            Err(CrawlError::Sink("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_sink_failure_still_returns_records() {
        use crate::session::memory::{Listing, Location, MemoryDirectory, MemorySessionFactory};

        let page = vec![Listing::new("Dr. Kept").with_location(Location::new(
            Some("Clinic"),
            &["1 Main St", "Oakville, ON", "L6J 1A1"],
        ))];
        let profile = SiteProfile::default();
        let factory = MemorySessionFactory::new(MemoryDirectory::new(vec![page]), profile.clone());
        let coordinator = CrawlCoordinator::new(factory, profile, CrawlSettings::default())
            .with_pacing(Pacing::immediate());
        let criteria = SearchCriteria::new("Oakville", "IV", 10).unwrap();

        let (report, written) = coordinator.run_to_sink(criteria, &BrokenSink).await;
        assert!(matches!(written, Err(CrawlError::Sink(_))));
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].name, "Dr. Kept");
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let once = dedup_records(vec![r("A", "1"), r("A", "1"), r("A", "2")]);
        let twice = dedup_records(once.clone());
        assert_eq!(once, twice);
    }
}
