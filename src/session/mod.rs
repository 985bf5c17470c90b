//! Browsing sessions: the serial, stateful medium the crawl runs on.
//!
//! A session is one browser tab. Navigation is sequential and "back" is the
//! only way to return to a previous view, so a session is never shared:
//! every crawl worker owns exactly one and closes it when done.

pub mod chrome;
mod locator;
pub mod memory;

pub use locator::Locator;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::SessionError;
use crate::models::Direction;

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// How an element ended up activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// A regular click went through.
    Clicked,
    /// The click was intercepted and a script activation was used instead.
    Forced { reason: String },
}

/// Capability the crawl engine needs from the rendering medium.
///
/// Lookups return `Ok(None)` / an empty `Vec` when nothing matches; `Err` is
/// reserved for genuine faults (timeouts, protocol errors, closed sessions).
#[async_trait]
pub trait BrowsingSession: Send {
    /// Opaque handle to an element on the current view.
    type Element: Send + Sync;

    async fn open(&mut self, url: &str) -> SessionResult<()>;

    async fn find_all(&mut self, locator: &Locator) -> SessionResult<Vec<Self::Element>>;

    async fn find(&mut self, locator: &Locator) -> SessionResult<Option<Self::Element>>;

    async fn find_within(
        &mut self,
        parent: &Self::Element,
        locator: &Locator,
    ) -> SessionResult<Option<Self::Element>>;

    async fn find_all_within(
        &mut self,
        parent: &Self::Element,
        locator: &Locator,
    ) -> SessionResult<Vec<Self::Element>>;

    async fn text(&mut self, element: &Self::Element) -> SessionResult<String>;

    /// Raw markup of an element, for diagnostics.
    async fn outer_html(&mut self, element: &Self::Element) -> SessionResult<String>;

    async fn is_displayed(&mut self, element: &Self::Element) -> SessionResult<bool>;

    /// Regular click. Fails with [`SessionError::ClickIntercepted`] when
    /// another element would receive it.
    async fn click(&mut self, element: &Self::Element) -> SessionResult<()>;

    /// Script-based activation that bypasses overlays.
    async fn force_click(&mut self, element: &Self::Element) -> SessionResult<()>;

    async fn scroll_into_view(&mut self, element: &Self::Element) -> SessionResult<()>;

    async fn scroll_to_bottom(&mut self) -> SessionResult<()>;

    async fn back(&mut self) -> SessionResult<()>;

    /// Wait until `locator` matches on the current view.
    async fn wait_until_present(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> SessionResult<()>;

    async fn close(&mut self) -> SessionResult<()>;

    /// Click, falling back once to a forced activation if the click is intercepted.
    async fn activate(&mut self, element: &Self::Element) -> SessionResult<Activation> {
        match self.click(element).await {
            Ok(()) => Ok(Activation::Clicked),
            Err(SessionError::ClickIntercepted(reason)) => {
                warn!("Click intercepted, retrying with script activation: {}", reason);
                self.force_click(element).await?;
                Ok(Activation::Forced { reason })
            }
            Err(e) => Err(e),
        }
    }
}

/// Creates one isolated session per crawl direction.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: BrowsingSession + 'static;

    async fn create(&self, direction: Direction) -> SessionResult<Self::Session>;
}
