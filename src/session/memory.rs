//! In-memory directory site implementing [`BrowsingSession`].
//!
//! Models the list / detail / sub-detail views of a directory, a single
//! history stack, pagination controls, and the failure modes seen on the
//! live site: intercepted clicks, list views that never finish loading,
//! hidden rows and malformed entries. Locators are resolved by comparing
//! them against the [`SiteProfile`] the session was built with.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{BrowsingSession, Locator, SessionFactory, SessionResult};
use crate::config::SiteProfile;
use crate::error::SessionError;
use crate::models::Direction;

/// Sub-detail view of a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubDetail {
    pub nested_attribute: Option<String>,
}

/// One practice location block on a detail view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub business_name: Option<String>,
    /// Text of the address block's parts. `None` means the block has no
    /// address element at all.
    pub address: Option<Vec<String>>,
}

impl Location {
    pub fn new(business_name: Option<&str>, parts: &[&str]) -> Self {
        Self {
            business_name: business_name.map(str::to_string),
            address: Some(parts.iter().map(|p| p.to_string()).collect()),
        }
    }

    /// Location block without an address element.
    pub fn without_address(business_name: Option<&str>) -> Self {
        Self {
            business_name: business_name.map(str::to_string),
            address: None,
        }
    }
}

/// One entry in the directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Listing {
    /// `None` models a row without a name heading.
    pub name: Option<String>,
    pub hidden: bool,
    pub category: Option<String>,
    pub primary_section: bool,
    pub sub_detail: Option<SubDetail>,
    /// Only the first location is listed until the toggle is activated.
    pub collapsible: bool,
    pub locations: Vec<Location>,
    /// Regular clicks on the entry link are intercepted by an overlay.
    pub intercept_click: bool,
    /// The list view never reappears after leaving this listing's detail view.
    pub stall_on_return: bool,
    /// The detail view is slow to reappear after leaving the sub-detail view;
    /// the next wait times out.
    pub slow_sub_detail_return: bool,
}

impl Listing {
    /// Listing with a name and primary section, nothing else.
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            primary_section: true,
            ..Default::default()
        }
    }

    /// Row with no name heading.
    pub fn malformed() -> Self {
        Self {
            primary_section: true,
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn without_primary_section(mut self) -> Self {
        self.primary_section = false;
        self
    }

    pub fn with_sub_detail(mut self, nested_attribute: Option<&str>) -> Self {
        self.sub_detail = Some(SubDetail {
            nested_attribute: nested_attribute.map(str::to_string),
        });
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    pub fn collapsible(mut self) -> Self {
        self.collapsible = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn intercepting_clicks(mut self) -> Self {
        self.intercept_click = true;
        self
    }

    pub fn stalling_on_return(mut self) -> Self {
        self.stall_on_return = true;
        self
    }

    pub fn slow_after_sub_detail(mut self) -> Self {
        self.slow_sub_detail_return = true;
        self
    }

    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

/// A paginated directory: `pages[i]` is the i-th list page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryDirectory {
    pub pages: Vec<Vec<Listing>>,
    /// Whether the pagination bar shows an ellipsis followed by a last-page link.
    pub jump_to_end: bool,
    /// List pages whose rows never appear after navigating to them.
    pub stalled_pages: Vec<usize>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            jump_to_end: true,
            stalled_pages: Vec::new(),
        }
    }
}

impl MemoryDirectory {
    pub fn new(pages: Vec<Vec<Listing>>) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    pub fn without_jump_to_end(mut self) -> Self {
        self.jump_to_end = false;
        self
    }

    pub fn with_stalled_page(mut self, page: usize) -> Self {
        self.stalled_pages.push(page);
        self
    }

    /// Load a directory description from a JSON file.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn listing(&self, page: usize, idx: usize) -> Option<&Listing> {
        self.pages.get(page).and_then(|p| p.get(idx))
    }

    fn location(&self, page: usize, idx: usize, loc: usize) -> Option<&Location> {
        self.listing(page, idx).and_then(|l| l.locations.get(loc))
    }
}

/// Something the session was asked to do, recorded for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    Open(String),
    Click(String),
    ForcedClick(String),
    ScrollIntoView(String),
    ScrollToBottom,
    Back,
    Close,
}

pub type ActionLog = Arc<Mutex<Vec<SessionAction>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Blank,
    List { page: usize },
    Detail { page: usize, idx: usize, expanded: bool },
    SubDetail { page: usize, idx: usize },
}

/// Element handle of the in-memory site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemElement {
    Row { page: usize, idx: usize },
    EntryName { page: usize, idx: usize },
    EntryLink { page: usize, idx: usize },
    DetailContainer,
    Category { page: usize, idx: usize },
    PrimarySection,
    SubDetailLink { page: usize, idx: usize },
    NestedAttribute { page: usize, idx: usize },
    Toggle,
    LocationRow { page: usize, idx: usize, loc: usize },
    BusinessName { page: usize, idx: usize, loc: usize },
    Address { page: usize, idx: usize, loc: usize },
    AddressPart { page: usize, idx: usize, loc: usize, part: usize },
    Next,
    Previous,
    JumpToEnd,
}

/// One tab on a [`MemoryDirectory`].
pub struct MemorySession {
    directory: Arc<MemoryDirectory>,
    profile: Arc<SiteProfile>,
    view: View,
    history: Vec<View>,
    unresponsive: bool,
    /// One-shot timeout for the next wait.
    slow_once: bool,
    closed: bool,
    actions: ActionLog,
}

impl MemorySession {
    pub fn new(directory: Arc<MemoryDirectory>, profile: Arc<SiteProfile>) -> Self {
        Self {
            directory,
            profile,
            view: View::Blank,
            history: Vec::new(),
            unresponsive: false,
            slow_once: false,
            closed: false,
            actions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to this session's action log.
    pub fn action_log(&self) -> ActionLog {
        self.actions.clone()
    }

    pub fn actions(&self) -> Vec<SessionAction> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn record(&self, action: SessionAction) {
        if let Ok(mut actions) = self.actions.lock() {
            actions.push(action);
        }
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    fn ensure_attached(&self, element: &MemElement) -> SessionResult<()> {
        let attached = match (*element, self.view) {
            (
                MemElement::Row { page, .. }
                | MemElement::EntryName { page, .. }
                | MemElement::EntryLink { page, .. },
                View::List { page: current },
            ) => page == current,
            (MemElement::Next | MemElement::Previous | MemElement::JumpToEnd, View::List { .. }) => {
                true
            }
            (MemElement::DetailContainer | MemElement::PrimarySection | MemElement::Toggle, View::Detail { .. }) => {
                true
            }
            (
                MemElement::Category { page, idx }
                | MemElement::SubDetailLink { page, idx }
                | MemElement::LocationRow { page, idx, .. }
                | MemElement::BusinessName { page, idx, .. }
                | MemElement::Address { page, idx, .. }
                | MemElement::AddressPart { page, idx, .. },
                View::Detail {
                    page: p, idx: i, ..
                },
            ) => page == p && idx == i,
            (MemElement::NestedAttribute { page, idx }, View::SubDetail { page: p, idx: i }) => {
                page == p && idx == i
            }
            _ => false,
        };
        if attached {
            Ok(())
        } else {
            Err(SessionError::Navigation(format!(
                "stale element reference: {:?}",
                element
            )))
        }
    }

    fn page_count(&self) -> usize {
        self.directory.pages.len()
    }

    fn locate(&self, locator: &Locator) -> Vec<MemElement> {
        let p = &*self.profile;
        match self.view {
            View::Blank => Vec::new(),
            View::List { page } => {
                if *locator == p.list_rows {
                    let rows = self.directory.pages.get(page).map(|r| r.len()).unwrap_or(0);
                    (0..rows).map(|idx| MemElement::Row { page, idx }).collect()
                } else if *locator == p.next_control && page + 1 < self.page_count() {
                    vec![MemElement::Next]
                } else if *locator == p.previous_control && page > 0 {
                    vec![MemElement::Previous]
                } else if *locator == p.jump_to_end
                    && self.directory.jump_to_end
                    && page + 1 < self.page_count()
                {
                    vec![MemElement::JumpToEnd]
                } else {
                    Vec::new()
                }
            }
            View::Detail {
                page,
                idx,
                expanded,
            } => {
                let Some(listing) = self.directory.listing(page, idx) else {
                    return Vec::new();
                };
                if *locator == p.detail_container {
                    vec![MemElement::DetailContainer]
                } else if *locator == p.category && listing.category.is_some() {
                    vec![MemElement::Category { page, idx }]
                } else if *locator == p.primary_section && listing.primary_section {
                    vec![MemElement::PrimarySection]
                } else if *locator == p.sub_detail_link && listing.sub_detail.is_some() {
                    vec![MemElement::SubDetailLink { page, idx }]
                } else if *locator == p.locations_toggle && listing.collapsible {
                    vec![MemElement::Toggle]
                } else if *locator == p.location_rows {
                    let shown = if listing.collapsible && !expanded {
                        listing.locations.len().min(1)
                    } else {
                        listing.locations.len()
                    };
                    (0..shown)
                        .map(|loc| MemElement::LocationRow { page, idx, loc })
                        .collect()
                } else {
                    Vec::new()
                }
            }
            View::SubDetail { page, idx } => {
                let has_attribute = self
                    .directory
                    .listing(page, idx)
                    .and_then(|l| l.sub_detail.as_ref())
                    .map(|s| s.nested_attribute.is_some())
                    .unwrap_or(false);
                if *locator == p.nested_attribute && has_attribute {
                    vec![MemElement::NestedAttribute { page, idx }]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn locate_within(&self, parent: &MemElement, locator: &Locator) -> Vec<MemElement> {
        let p = &*self.profile;
        match *parent {
            MemElement::Row { page, idx } => {
                let named = self
                    .directory
                    .listing(page, idx)
                    .map(|l| l.name.is_some())
                    .unwrap_or(false);
                if !named {
                    Vec::new()
                } else if *locator == p.entry_name {
                    vec![MemElement::EntryName { page, idx }]
                } else if *locator == p.entry_link {
                    vec![MemElement::EntryLink { page, idx }]
                } else {
                    Vec::new()
                }
            }
            MemElement::LocationRow { page, idx, loc } => {
                let Some(location) = self.directory.location(page, idx, loc) else {
                    return Vec::new();
                };
                if *locator == p.location_business_name && location.business_name.is_some() {
                    vec![MemElement::BusinessName { page, idx, loc }]
                } else if *locator == p.location_address && location.address.is_some() {
                    vec![MemElement::Address { page, idx, loc }]
                } else {
                    Vec::new()
                }
            }
            MemElement::Address { page, idx, loc } if *locator == p.address_parts => {
                let parts = self
                    .directory
                    .location(page, idx, loc)
                    .and_then(|l| l.address.as_ref())
                    .map(|a| a.len())
                    .unwrap_or(0);
                (0..parts)
                    .map(|part| MemElement::AddressPart {
                        page,
                        idx,
                        loc,
                        part,
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    fn element_text(&self, element: &MemElement) -> String {
        let dir = &self.directory;
        match *element {
            MemElement::Row { page, idx }
            | MemElement::EntryName { page, idx }
            | MemElement::EntryLink { page, idx } => dir
                .listing(page, idx)
                .map(|l| l.display_name().to_string())
                .unwrap_or_default(),
            MemElement::DetailContainer => String::new(),
            MemElement::Category { page, idx } => dir
                .listing(page, idx)
                .and_then(|l| l.category.clone())
                .unwrap_or_default(),
            MemElement::PrimarySection => "Primary Practice".to_string(),
            MemElement::SubDetailLink { .. } => "View Facility Permits".to_string(),
            MemElement::NestedAttribute { page, idx } => dir
                .listing(page, idx)
                .and_then(|l| l.sub_detail.as_ref())
                .and_then(|s| s.nested_attribute.clone())
                .unwrap_or_default(),
            MemElement::Toggle => "See All Practice Locations".to_string(),
            MemElement::LocationRow { page, idx, loc } => dir
                .location(page, idx, loc)
                .map(|l| {
                    let mut lines: Vec<String> = l.business_name.iter().cloned().collect();
                    lines.extend(l.address.iter().flatten().cloned());
                    lines.join("\n")
                })
                .unwrap_or_default(),
            MemElement::BusinessName { page, idx, loc } => dir
                .location(page, idx, loc)
                .and_then(|l| l.business_name.clone())
                .unwrap_or_default(),
            MemElement::Address { page, idx, loc } => dir
                .location(page, idx, loc)
                .and_then(|l| l.address.as_ref())
                .map(|a| a.join("\n"))
                .unwrap_or_default(),
            MemElement::AddressPart {
                page,
                idx,
                loc,
                part,
            } => dir
                .location(page, idx, loc)
                .and_then(|l| l.address.as_ref())
                .and_then(|a| a.get(part).cloned())
                .unwrap_or_default(),
            MemElement::Next => "Next".to_string(),
            MemElement::Previous => "Previous".to_string(),
            MemElement::JumpToEnd => self.page_count().to_string(),
        }
    }

    fn label(&self, element: &MemElement) -> String {
        match *element {
            MemElement::EntryLink { page, idx } => format!(
                "entry:{}",
                self.directory
                    .listing(page, idx)
                    .map(|l| l.display_name())
                    .unwrap_or("")
            ),
            MemElement::SubDetailLink { .. } => "sub_detail".to_string(),
            MemElement::Toggle => "toggle".to_string(),
            MemElement::Next => "next".to_string(),
            MemElement::Previous => "previous".to_string(),
            MemElement::JumpToEnd => "jump_to_end".to_string(),
            other => format!("{:?}", other),
        }
    }

    fn navigate(&mut self, view: View) {
        self.history.push(self.view);
        self.view = view;
    }

    fn perform(&mut self, element: &MemElement) {
        match *element {
            MemElement::EntryLink { page, idx } => self.navigate(View::Detail {
                page,
                idx,
                expanded: false,
            }),
            MemElement::SubDetailLink { page, idx } => {
                self.navigate(View::SubDetail { page, idx })
            }
            MemElement::Toggle => {
                if let View::Detail { expanded, .. } = &mut self.view {
                    *expanded = true;
                }
            }
            MemElement::Next => {
                if let View::List { page } = self.view {
                    self.navigate(View::List { page: page + 1 });
                }
            }
            MemElement::Previous => {
                if let View::List { page } = self.view {
                    self.navigate(View::List {
                        page: page.saturating_sub(1),
                    });
                }
            }
            MemElement::JumpToEnd => {
                let last = self.page_count().saturating_sub(1);
                self.navigate(View::List { page: last });
            }
            _ => {}
        }
    }

    fn view_is_loading(&self) -> bool {
        match self.view {
            View::List { page } => self.directory.stalled_pages.contains(&page),
            _ => false,
        }
    }
}

#[async_trait]
impl BrowsingSession for MemorySession {
    type Element = MemElement;

    async fn open(&mut self, url: &str) -> SessionResult<()> {
        self.ensure_open()?;
        self.record(SessionAction::Open(url.to_string()));
        self.history.clear();
        self.unresponsive = false;
        self.slow_once = false;
        self.view = View::List { page: 0 };
        Ok(())
    }

    async fn find_all(&mut self, locator: &Locator) -> SessionResult<Vec<MemElement>> {
        self.ensure_open()?;
        Ok(self.locate(locator))
    }

    async fn find(&mut self, locator: &Locator) -> SessionResult<Option<MemElement>> {
        self.ensure_open()?;
        Ok(self.locate(locator).into_iter().next())
    }

    async fn find_within(
        &mut self,
        parent: &MemElement,
        locator: &Locator,
    ) -> SessionResult<Option<MemElement>> {
        self.ensure_open()?;
        self.ensure_attached(parent)?;
        Ok(self.locate_within(parent, locator).into_iter().next())
    }

    async fn find_all_within(
        &mut self,
        parent: &MemElement,
        locator: &Locator,
    ) -> SessionResult<Vec<MemElement>> {
        self.ensure_open()?;
        self.ensure_attached(parent)?;
        Ok(self.locate_within(parent, locator))
    }

    async fn text(&mut self, element: &MemElement) -> SessionResult<String> {
        self.ensure_open()?;
        self.ensure_attached(element)?;
        Ok(self.element_text(element))
    }

    async fn outer_html(&mut self, element: &MemElement) -> SessionResult<String> {
        self.ensure_open()?;
        self.ensure_attached(element)?;
        let html = match *element {
            MemElement::Row { page, idx } => match self.directory.listing(page, idx) {
                Some(Listing {
                    name: Some(name), ..
                }) => format!(
                    "<div class=\"row\"><h2><a href=\"#\">{}</a></h2></div>",
                    name
                ),
                _ => "<div class=\"row\"><p>Listing unavailable</p></div>".to_string(),
            },
            other => format!("<span>{}</span>", self.element_text(&other)),
        };
        Ok(html)
    }

    async fn is_displayed(&mut self, element: &MemElement) -> SessionResult<bool> {
        self.ensure_open()?;
        self.ensure_attached(element)?;
        Ok(match *element {
            MemElement::Row { page, idx } => self
                .directory
                .listing(page, idx)
                .map(|l| !l.hidden)
                .unwrap_or(false),
            _ => true,
        })
    }

    async fn click(&mut self, element: &MemElement) -> SessionResult<()> {
        self.ensure_open()?;
        self.ensure_attached(element)?;
        if let MemElement::EntryLink { page, idx } = *element {
            let intercepted = self
                .directory
                .listing(page, idx)
                .map(|l| l.intercept_click)
                .unwrap_or(false);
            if intercepted {
                return Err(SessionError::ClickIntercepted(
                    "element <div class=\"modal-backdrop\"> would receive the click".to_string(),
                ));
            }
        }
        self.record(SessionAction::Click(self.label(element)));
        self.perform(element);
        Ok(())
    }

    async fn force_click(&mut self, element: &MemElement) -> SessionResult<()> {
        self.ensure_open()?;
        self.ensure_attached(element)?;
        self.record(SessionAction::ForcedClick(self.label(element)));
        self.perform(element);
        Ok(())
    }

    async fn scroll_into_view(&mut self, element: &MemElement) -> SessionResult<()> {
        self.ensure_open()?;
        self.ensure_attached(element)?;
        self.record(SessionAction::ScrollIntoView(self.label(element)));
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> SessionResult<()> {
        self.ensure_open()?;
        self.record(SessionAction::ScrollToBottom);
        Ok(())
    }

    async fn back(&mut self) -> SessionResult<()> {
        self.ensure_open()?;
        self.record(SessionAction::Back);
        let previous = self
            .history
            .pop()
            .ok_or_else(|| SessionError::Navigation("no previous page in history".to_string()))?;
        let leaving = std::mem::replace(&mut self.view, previous);
        if let (View::SubDetail { page, idx }, View::Detail { .. }) = (leaving, previous) {
            self.slow_once = self
                .directory
                .listing(page, idx)
                .map(|l| l.slow_sub_detail_return)
                .unwrap_or(false);
        }
        if let (View::Detail { page, idx, .. }, View::List { .. }) = (leaving, previous) {
            if self
                .directory
                .listing(page, idx)
                .map(|l| l.stall_on_return)
                .unwrap_or(false)
            {
                self.unresponsive = true;
            }
        }
        Ok(())
    }

    async fn wait_until_present(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> SessionResult<()> {
        self.ensure_open()?;
        let slow = std::mem::take(&mut self.slow_once);
        if slow || self.unresponsive || self.view_is_loading() || self.locate(locator).is_empty() {
            return Err(SessionError::Timeout {
                what: locator.to_string(),
                secs: timeout.as_secs(),
            });
        }
        Ok(())
    }

    async fn close(&mut self) -> SessionResult<()> {
        self.ensure_open()?;
        self.record(SessionAction::Close);
        self.closed = true;
        Ok(())
    }
}

/// Hands out one [`MemorySession`] per direction and keeps their action logs.
pub struct MemorySessionFactory {
    directory: Arc<MemoryDirectory>,
    profile: Arc<SiteProfile>,
    unavailable: Vec<Direction>,
    logs: Mutex<HashMap<Direction, ActionLog>>,
}

impl MemorySessionFactory {
    pub fn new(directory: MemoryDirectory, profile: SiteProfile) -> Self {
        Self {
            directory: Arc::new(directory),
            profile: Arc::new(profile),
            unavailable: Vec::new(),
            logs: Mutex::new(HashMap::new()),
        }
    }

    /// Make session creation fail for one direction.
    pub fn with_unavailable(mut self, direction: Direction) -> Self {
        self.unavailable.push(direction);
        self
    }

    /// Actions performed by the session created for `direction`.
    pub fn actions(&self, direction: Direction) -> Vec<SessionAction> {
        self.logs
            .lock()
            .ok()
            .and_then(|logs| logs.get(&direction).cloned())
            .and_then(|log| log.lock().ok().map(|a| a.clone()))
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionFactory for MemorySessionFactory {
    type Session = MemorySession;

    async fn create(&self, direction: Direction) -> SessionResult<MemorySession> {
        if self.unavailable.contains(&direction) {
            return Err(SessionError::Launch(format!(
                "no browser available for {} crawl",
                direction
            )));
        }
        let session = MemorySession::new(self.directory.clone(), self.profile.clone());
        if let Ok(mut logs) = self.logs.lock() {
            logs.insert(direction, session.action_log());
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(pages: Vec<Vec<Listing>>) -> MemorySession {
        MemorySession::new(
            Arc::new(MemoryDirectory::new(pages)),
            Arc::new(SiteProfile::default()),
        )
    }

    #[tokio::test]
    async fn test_detail_navigation_and_back() {
        let profile = SiteProfile::default();
        let mut s = session(vec![vec![Listing::new("Dr. A")]]);
        s.open("https://example.test").await.unwrap();

        let rows = s.find_all(&profile.list_rows).await.unwrap();
        assert_eq!(rows.len(), 1);
        let link = s
            .find_within(&rows[0], &profile.entry_link)
            .await
            .unwrap()
            .unwrap();
        s.click(&link).await.unwrap();
        assert!(s
            .wait_until_present(&profile.detail_container, Duration::from_secs(1))
            .await
            .is_ok());

        // Row handles from the list view are stale while on the detail view
        assert!(s.text(&rows[0]).await.is_err());

        s.back().await.unwrap();
        assert!(s
            .wait_until_present(&profile.list_rows, Duration::from_secs(1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_intercepted_click_falls_back_to_forced() {
        let profile = SiteProfile::default();
        let mut s = session(vec![vec![Listing::new("Dr. A").intercepting_clicks()]]);
        s.open("https://example.test").await.unwrap();

        let row = s.find(&profile.list_rows).await.unwrap().unwrap();
        let link = s.find_within(&row, &profile.entry_link).await.unwrap().unwrap();
        assert!(matches!(
            s.click(&link).await,
            Err(SessionError::ClickIntercepted(_))
        ));

        let activation = s.activate(&link).await.unwrap();
        assert!(matches!(activation, crate::session::Activation::Forced { .. }));
        assert!(s
            .actions()
            .contains(&SessionAction::ForcedClick("entry:Dr. A".to_string())));
    }

    #[tokio::test]
    async fn test_pagination_controls_depend_on_page() {
        let profile = SiteProfile::default();
        let mut s = session(vec![
            vec![Listing::new("A")],
            vec![Listing::new("B")],
            vec![Listing::new("C")],
        ]);
        s.open("https://example.test").await.unwrap();
        assert!(s.find(&profile.previous_control).await.unwrap().is_none());
        assert!(s.find(&profile.jump_to_end).await.unwrap().is_some());

        let last = s.find(&profile.jump_to_end).await.unwrap().unwrap();
        s.click(&last).await.unwrap();
        assert!(s.find(&profile.next_control).await.unwrap().is_none());
        assert!(s.find(&profile.previous_control).await.unwrap().is_some());

        let row = s.find(&profile.list_rows).await.unwrap().unwrap();
        assert_eq!(s.text(&row).await.unwrap(), "C");
    }

    #[tokio::test]
    async fn test_closed_session_rejects_calls() {
        let mut s = session(vec![vec![Listing::new("A")]]);
        s.close().await.unwrap();
        assert!(matches!(
            s.open("https://example.test").await,
            Err(SessionError::Closed)
        ));
    }

    #[test]
    fn test_directory_from_json() {
        let json = r#"{
            "pages": [[
                {"name": "Dr. A", "primary_section": true,
                 "locations": [{"business_name": "Clinic", "address": ["1 Main St", "Oakville, ON", "L6J 1A1"]}]}
            ]]
        }"#;
        let directory: MemoryDirectory = serde_json::from_str(json).unwrap();
        assert!(directory.jump_to_end);
        assert_eq!(directory.pages[0][0].locations.len(), 1);
    }
}
