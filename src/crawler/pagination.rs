//! Sequential list-page traversal in one direction.

use std::sync::Arc;

use tracing::{debug, warn};

use super::Pacing;
use crate::config::SiteProfile;
use crate::error::CrawlResult;
use crate::models::{Direction, PageCursor};
use crate::session::{Activation, BrowsingSession, Locator};
use crate::status::StatusReporter;

/// Drives list pages for one worker.
///
/// Forward engines only ever touch the "next" control and backward engines
/// only the "previous" control; pages are reached strictly by stepping.
pub struct PaginationEngine {
    cursor: PageCursor,
    profile: Arc<SiteProfile>,
    pacing: Pacing,
    batch_size: usize,
}

impl PaginationEngine {
    pub fn new(
        direction: Direction,
        profile: Arc<SiteProfile>,
        pacing: Pacing,
        batch_size: usize,
    ) -> Self {
        Self {
            cursor: PageCursor::new(direction),
            profile,
            pacing,
            batch_size: batch_size.max(1),
        }
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    pub fn direction(&self) -> Direction {
        self.cursor.direction
    }

    fn step_control(&self) -> &Locator {
        match self.cursor.direction {
            Direction::Forward => &self.profile.next_control,
            Direction::Backward => &self.profile.previous_control,
        }
    }

    /// Open the list view and wait for its rows.
    pub async fn open_list<S: BrowsingSession>(
        &mut self,
        session: &mut S,
        url: &str,
        status: &StatusReporter,
    ) -> CrawlResult<()> {
        status.report(format!("Fetching data from URL: {}", url));
        session.open(url).await?;
        session
            .wait_until_present(&self.profile.list_rows, self.pacing.wait_timeout)
            .await?;
        self.pacing.settle().await;
        Ok(())
    }

    async fn visible_rows<S: BrowsingSession>(
        &self,
        session: &mut S,
    ) -> CrawlResult<Vec<S::Element>> {
        let rows = session.find_all(&self.profile.list_rows).await?;
        let mut visible = Vec::with_capacity(rows.len());
        for row in rows {
            if session.is_displayed(&row).await? {
                visible.push(row);
            }
        }
        Ok(visible)
    }

    /// Visible entries on the current page, capped at the batch size.
    pub async fn current_entries<S: BrowsingSession>(
        &mut self,
        session: &mut S,
        status: &StatusReporter,
    ) -> CrawlResult<Vec<S::Element>> {
        let mut visible = self.visible_rows(session).await?;
        self.cursor.last_page_entry_count = visible.len();
        status.report(format!(
            "Found {} visible entries on the current page.",
            visible.len()
        ));
        visible.truncate(self.batch_size);
        Ok(visible)
    }

    /// Fresh handle to the `index`-th visible entry.
    ///
    /// Handles go stale once the session navigates away, so the worker
    /// re-resolves each entry after returning to the list.
    pub async fn entry_at<S: BrowsingSession>(
        &self,
        session: &mut S,
        index: usize,
    ) -> CrawlResult<Option<S::Element>> {
        if index >= self.batch_size {
            return Ok(None);
        }
        Ok(self.visible_rows(session).await?.into_iter().nth(index))
    }

    /// Step one page in this engine's direction.
    ///
    /// Returns `false` when the control is absent or the next list view never
    /// appears; other session faults propagate.
    pub async fn advance<S: BrowsingSession>(
        &mut self,
        session: &mut S,
        status: &StatusReporter,
    ) -> CrawlResult<bool> {
        if !self.cursor.has_more {
            return Ok(false);
        }

        status.report("Scrolling to the bottom of the page");
        session.scroll_to_bottom().await?;
        self.pacing.settle().await;

        let control = match session.find(self.step_control()).await? {
            Some(control) => control,
            None => {
                status.report("No more results to reveal.");
                self.cursor.has_more = false;
                return Ok(false);
            }
        };

        let label = session.text(&control).await?;
        status.report(format!(
            "{} button found. Clicking to reveal more results.",
            label
        ));
        if let Activation::Forced { reason } = session.activate(&control).await? {
            status.report(format!("Click intercepted, retrying: {}", reason));
        }

        if let Err(e) = session
            .wait_until_present(&self.profile.list_rows, self.pacing.wait_timeout)
            .await
        {
            if !e.is_timeout() {
                return Err(e.into());
            }
            status.report(format!("No more results to reveal: {}", e));
            self.cursor.has_more = false;
            return Ok(false);
        }
        self.pacing.settle().await;

        self.cursor.pages_advanced += 1;
        debug!(
            "{} engine advanced {} page(s)",
            self.cursor.direction, self.cursor.pages_advanced
        );
        status.report("More results revealed. Continuing.");
        Ok(true)
    }

    /// Jump to the last list page before the first read (backward only).
    ///
    /// If the control cannot be located the crawl proceeds from the current
    /// page; returns whether the jump happened.
    pub async fn seek_to_last<S: BrowsingSession>(
        &mut self,
        session: &mut S,
        status: &StatusReporter,
    ) -> CrawlResult<bool> {
        if self.cursor.direction != Direction::Backward {
            debug!("Ignoring seek to last page for forward engine");
            return Ok(false);
        }

        session.scroll_to_bottom().await?;
        self.pacing.settle().await;

        let located = match session
            .wait_until_present(&self.profile.jump_to_end, self.pacing.wait_timeout)
            .await
        {
            Ok(()) => session.find(&self.profile.jump_to_end).await?,
            Err(e) if e.is_timeout() => None,
            Err(e) => return Err(e.into()),
        };
        let Some(last) = located else {
            warn!("Last page control not found; reading from the first page");
            status.report("Error navigating to last page: control not found. Continuing from the current page.");
            return Ok(false);
        };

        session.scroll_into_view(&last).await?;
        self.pacing.settle().await;
        if let Activation::Forced { reason } = session.activate(&last).await? {
            status.report(format!("Click intercepted, retrying: {}", reason));
        }
        match session
            .wait_until_present(&self.profile.list_rows, self.pacing.wait_timeout)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_timeout() => {
                warn!("Last page never loaded: {}", e);
                status.report(format!(
                    "Error navigating to last page: {}. Continuing from the first page.",
                    e
                ));
                session.back().await?;
                session
                    .wait_until_present(&self.profile.list_rows, self.pacing.wait_timeout)
                    .await?;
                self.pacing.settle().await;
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }
        self.pacing.settle().await;
        status.report("Reached the last page of results.");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrawlError;
    use crate::session::memory::{Listing, MemoryDirectory, MemorySession, SessionAction};
    use crate::status::TracingObserver;

    fn pages(n: usize, per_page: usize) -> Vec<Vec<Listing>> {
        (0..n)
            .map(|p| {
                (0..per_page)
                    .map(|i| Listing::new(&format!("Dr. {}-{}", p, i)))
                    .collect()
            })
            .collect()
    }

    fn setup(
        directory: MemoryDirectory,
        direction: Direction,
    ) -> (PaginationEngine, MemorySession, StatusReporter) {
        let profile = Arc::new(SiteProfile::default());
        let engine = PaginationEngine::new(direction, profile.clone(), Pacing::immediate(), 10);
        let session = MemorySession::new(Arc::new(directory), profile);
        let status = StatusReporter::new(Some(direction), Arc::new(TracingObserver));
        (engine, session, status)
    }

    #[tokio::test]
    async fn test_current_entries_caps_batch_and_skips_hidden() {
        let mut page: Vec<Listing> = (0..12).map(|i| Listing::new(&format!("Dr. {}", i))).collect();
        page[0] = Listing::new("Hidden").hidden();
        let (mut engine, mut session, status) =
            setup(MemoryDirectory::new(vec![page]), Direction::Forward);

        engine
            .open_list(&mut session, "https://example.test", &status)
            .await
            .unwrap();
        let entries = engine.current_entries(&mut session, &status).await.unwrap();
        assert_eq!(entries.len(), 10);
        assert_eq!(engine.cursor().last_page_entry_count, 11);
        assert_eq!(session.text(&entries[0]).await.unwrap(), "Dr. 1");
    }

    #[tokio::test]
    async fn test_forward_advances_until_exhausted() {
        let (mut engine, mut session, status) =
            setup(MemoryDirectory::new(pages(3, 2)), Direction::Forward);
        engine
            .open_list(&mut session, "https://example.test", &status)
            .await
            .unwrap();

        assert!(engine.advance(&mut session, &status).await.unwrap());
        assert!(engine.advance(&mut session, &status).await.unwrap());
        assert!(!engine.advance(&mut session, &status).await.unwrap());
        assert_eq!(engine.cursor().pages_advanced, 2);
        assert!(!engine.cursor().has_more);

        let actions = session.actions();
        assert!(!actions.iter().any(|a| matches!(a, SessionAction::Click(l) if l == "previous")));
    }

    #[tokio::test]
    async fn test_backward_seeks_then_steps_back() {
        let (mut engine, mut session, status) =
            setup(MemoryDirectory::new(pages(3, 1)), Direction::Backward);
        engine
            .open_list(&mut session, "https://example.test", &status)
            .await
            .unwrap();

        assert!(engine.seek_to_last(&mut session, &status).await.unwrap());
        let entries = engine.current_entries(&mut session, &status).await.unwrap();
        assert_eq!(session.text(&entries[0]).await.unwrap(), "Dr. 2-0");

        assert!(engine.advance(&mut session, &status).await.unwrap());
        assert!(engine.advance(&mut session, &status).await.unwrap());
        assert!(!engine.advance(&mut session, &status).await.unwrap());

        let actions = session.actions();
        assert!(!actions.iter().any(|a| matches!(a, SessionAction::Click(l) if l == "next")));
    }

    #[tokio::test]
    async fn test_seek_without_control_falls_back_to_first_page() {
        let (mut engine, mut session, status) = setup(
            MemoryDirectory::new(pages(2, 1)).without_jump_to_end(),
            Direction::Backward,
        );
        engine
            .open_list(&mut session, "https://example.test", &status)
            .await
            .unwrap();

        assert!(!engine.seek_to_last(&mut session, &status).await.unwrap());
        let entries = engine.current_entries(&mut session, &status).await.unwrap();
        assert_eq!(session.text(&entries[0]).await.unwrap(), "Dr. 0-0");
    }

    #[tokio::test]
    async fn test_seek_to_stalled_last_page_falls_back_to_first_page() {
        let (mut engine, mut session, status) = setup(
            MemoryDirectory::new(pages(3, 1)).with_stalled_page(2),
            Direction::Backward,
        );
        engine
            .open_list(&mut session, "https://example.test", &status)
            .await
            .unwrap();

        assert!(!engine.seek_to_last(&mut session, &status).await.unwrap());
        let entries = engine.current_entries(&mut session, &status).await.unwrap();
        assert_eq!(session.text(&entries[0]).await.unwrap(), "Dr. 0-0");

        let actions = session.actions();
        assert!(actions.contains(&SessionAction::Click("jump_to_end".to_string())));
        assert!(actions.contains(&SessionAction::Back));
    }

    #[tokio::test]
    async fn test_advance_to_stalled_page_reports_exhaustion() {
        let (mut engine, mut session, status) = setup(
            MemoryDirectory::new(pages(2, 1)).with_stalled_page(1),
            Direction::Forward,
        );
        engine
            .open_list(&mut session, "https://example.test", &status)
            .await
            .unwrap();
        assert!(!engine.advance(&mut session, &status).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_list_times_out_on_empty_directory() {
        let (mut engine, mut session, status) =
            setup(MemoryDirectory::new(Vec::new()), Direction::Forward);
        let err = engine
            .open_list(&mut session, "https://example.test", &status)
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::NavigationTimeout(_)));
    }
}
