//! Error types for the session medium and the crawl engine.

use thiserror::Error;

/// Failure reported by a [`BrowsingSession`](crate::session::BrowsingSession).
///
/// An element that is simply absent is not an error: lookups return
/// `Ok(None)` and the caller decides what absence means.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },
    #[error("Click intercepted: {0}")]
    ClickIntercepted(String),
    #[error("Navigation failed: {0}")]
    Navigation(String),
    #[error("Browser protocol error: {0}")]
    Protocol(String),
    #[error("Failed to start browser session: {0}")]
    Launch(String),
    #[error("Session already closed")]
    Closed,
}

impl SessionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Timeout { .. })
    }
}

/// Errors surfaced by the crawl engine.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Navigation timeout: {0}")]
    NavigationTimeout(String),
    #[error("Required element not found: {0}")]
    ElementNotFound(String),
    #[error("Click intercepted: {0}")]
    ClickIntercepted(String),
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Failed to parse entry: {reason}")]
    EntryParse { reason: String, raw: Option<String> },
    #[error("Session error: {0}")]
    Session(SessionError),
    #[error("Failed to write results: {0}")]
    Sink(String),
}

impl From<SessionError> for CrawlError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Timeout { what, secs } => {
                CrawlError::NavigationTimeout(format!("{} ({}s)", what, secs))
            }
            SessionError::ClickIntercepted(msg) => CrawlError::ClickIntercepted(msg),
            other => CrawlError::Session(other),
        }
    }
}

pub type CrawlResult<T> = std::result::Result<T, CrawlError>;
