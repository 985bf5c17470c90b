//! Per-entry filter pipeline.
//!
//! An entry goes through four gates in order: category exclusion, primary
//! section presence, the optional sub-detail attribute match and location
//! extraction. Each gate decides for itself what a missing element means.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::Pacing;
use crate::config::SiteProfile;
use crate::error::{CrawlError, CrawlResult};
use crate::models::{Record, SearchCriteria};
use crate::session::{Activation, BrowsingSession};
use crate::status::StatusReporter;

/// How far from the list view the session has navigated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ViewDepth {
    List,
    Detail,
    SubDetail,
}

impl ViewDepth {
    /// Number of `back()` steps needed to reach the list view.
    pub fn steps_to_list(self) -> usize {
        match self {
            ViewDepth::List => 0,
            ViewDepth::Detail => 1,
            ViewDepth::SubDetail => 2,
        }
    }
}

/// Why an entry was filtered out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The detail view carries a category attribute (any value).
    Category(String),
    NoPrimarySection,
    /// Nested attribute present but without the required substring.
    SecondaryMismatch(String),
    /// Sub-detail view reached but the nested attribute is missing.
    SecondaryMissing,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Category(value) => write!(f, "category attribute present ({})", value),
            Rejection::NoPrimarySection => write!(f, "no primary section"),
            Rejection::SecondaryMismatch(value) => {
                write!(f, "secondary attribute does not match ({})", value)
            }
            Rejection::SecondaryMissing => write!(f, "secondary attribute missing"),
        }
    }
}

#[derive(Debug)]
pub enum Verdict {
    /// Passed every gate. May hold zero records if no location matched.
    Accepted(Vec<Record>),
    Rejected(Rejection),
    /// Unexpected fault; the entry yields nothing.
    Faulted(CrawlError),
}

/// Result of running one entry through the pipeline.
#[derive(Debug)]
pub struct Evaluation {
    pub name: Option<String>,
    pub verdict: Verdict,
    /// Where the session was left. The caller must return to the list view.
    pub depth: ViewDepth,
}

impl Evaluation {
    pub fn records(&self) -> &[Record] {
        match &self.verdict {
            Verdict::Accepted(records) => records,
            _ => &[],
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self.verdict {
            Verdict::Accepted(records) => records,
            _ => Vec::new(),
        }
    }
}

/// Text read from one location block: business name and address parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationFields {
    pub business_name: String,
    /// Address block parts, expected as `[street, locality, postal code]`.
    pub parts: Vec<String>,
}

impl LocationFields {
    /// Turn the block into a record for `name`, or `None` if its locality
    /// doesn't match the search city.
    ///
    /// Blocks with fewer than three parts can't be checked and are kept with
    /// empty address and city.
    pub fn into_record(
        self,
        name: &str,
        criteria: &SearchCriteria,
        province: &str,
    ) -> Option<Record> {
        if self.parts.len() < 3 {
            return Some(Record::new(name, self.business_name, "", ""));
        }

        let street = self.parts[0].trim();
        let locality = self.parts[1].trim().replace(',', "");
        let postal = self.parts[2].trim();
        if !criteria.city_matches(&locality) {
            return None;
        }

        Some(Record::new(
            name,
            self.business_name,
            street,
            format!("{} {} {}", criteria.city, province, postal),
        ))
    }
}

/// Runs entries through the filter gates.
pub struct RecordFilterPipeline {
    profile: Arc<SiteProfile>,
    pacing: Pacing,
}

impl RecordFilterPipeline {
    pub fn new(profile: Arc<SiteProfile>, pacing: Pacing) -> Self {
        Self { profile, pacing }
    }

    /// Evaluate one list entry.
    ///
    /// Never fails: faults are logged with the entry's markup and reported as
    /// [`Verdict::Faulted`]. The session is left at `Evaluation::depth`.
    pub async fn evaluate<S: BrowsingSession>(
        &self,
        session: &mut S,
        entry: &S::Element,
        criteria: &SearchCriteria,
        status: &StatusReporter,
    ) -> Evaluation {
        let raw = session.outer_html(entry).await.ok();
        let mut eval = Evaluation {
            name: None,
            verdict: Verdict::Accepted(Vec::new()),
            depth: ViewDepth::List,
        };

        match self
            .run_gates(session, entry, criteria, status, &mut eval)
            .await
        {
            Ok(verdict) => eval.verdict = verdict,
            Err(err) => {
                let err = match err {
                    CrawlError::EntryParse { reason, raw: None } => CrawlError::EntryParse {
                        reason,
                        raw: raw.clone(),
                    },
                    other => other,
                };
                warn!("Failed to evaluate entry {:?}: {}", eval.name, err);
                status.report(format!("Error parsing entry: {}", err));
                if let Some(html) = &raw {
                    status.report(html);
                }
                eval.verdict = Verdict::Faulted(err);
            }
        }
        eval
    }

    async fn run_gates<S: BrowsingSession>(
        &self,
        session: &mut S,
        entry: &S::Element,
        criteria: &SearchCriteria,
        status: &StatusReporter,
        eval: &mut Evaluation,
    ) -> CrawlResult<Verdict> {
        let p = &*self.profile;
        let timeout = self.pacing.wait_timeout;

        let heading = session
            .find_within(entry, &p.entry_name)
            .await?
            .ok_or_else(|| CrawlError::EntryParse {
                reason: "entry has no name heading".to_string(),
                raw: None,
            })?;
        let name = session.text(&heading).await?.trim().to_string();
        eval.name = Some(name.clone());

        let link = session
            .find_within(entry, &p.entry_link)
            .await?
            .ok_or_else(|| CrawlError::EntryParse {
                reason: format!("entry {} has no detail link", name),
                raw: None,
            })?;
        session.scroll_into_view(&link).await?;
        self.pacing.settle().await;
        self.follow(session, &link, status).await?;
        eval.depth = ViewDepth::Detail;
        session.wait_until_present(&p.detail_container, timeout).await?;

        // Presence alone disqualifies
        if let Some(category) = session.find(&p.category).await? {
            let value = session.text(&category).await?.trim().to_string();
            status.report(format!("Category found for {} ({}), skipping...", name, value));
            return Ok(Verdict::Rejected(Rejection::Category(value)));
        }

        if session.find(&p.primary_section).await?.is_none() {
            status.report(format!("No primary section for {}, skipping...", name));
            return Ok(Verdict::Rejected(Rejection::NoPrimarySection));
        }

        // No sub-detail link means the gate doesn't apply
        if let Some(sub_link) = session.find(&p.sub_detail_link).await? {
            session.scroll_into_view(&sub_link).await?;
            self.pacing.settle().await;
            self.follow(session, &sub_link, status).await?;
            eval.depth = ViewDepth::SubDetail;

            let attribute = match session.wait_until_present(&p.nested_attribute, timeout).await {
                Ok(()) => session.find(&p.nested_attribute).await?,
                Err(e) if e.is_timeout() => None,
                Err(e) => return Err(e.into()),
            };
            let Some(attribute) = attribute else {
                status.report(format!("No secondary attribute found for {}, skipping...", name));
                return Ok(Verdict::Rejected(Rejection::SecondaryMissing));
            };

            let value = session.text(&attribute).await?.trim().to_string();
            status.report(format!("Secondary attribute for {}: {}", name, value));
            if !criteria.secondary_matches(&value) {
                status.report(format!(
                    "{} does not contain {}, skipping...",
                    value, criteria.secondary_filter
                ));
                return Ok(Verdict::Rejected(Rejection::SecondaryMismatch(value)));
            }

            session.back().await?;
            eval.depth = ViewDepth::Detail;
            session.wait_until_present(&p.detail_container, timeout).await?;
            self.pacing.settle().await;
        }

        let records = self.collect_locations(session, &name, criteria, status).await?;
        Ok(Verdict::Accepted(records))
    }

    async fn follow<S: BrowsingSession>(
        &self,
        session: &mut S,
        link: &S::Element,
        status: &StatusReporter,
    ) -> CrawlResult<()> {
        if let Activation::Forced { reason } = session.activate(link).await? {
            status.report(format!("Click intercepted, retrying: {}", reason));
        }
        self.pacing.settle().await;
        Ok(())
    }

    /// Expand the location list if it is collapsible. Returns whether a
    /// toggle was activated.
    async fn expand_locations<S: BrowsingSession>(&self, session: &mut S) -> CrawlResult<bool> {
        let Some(toggle) = session.find(&self.profile.locations_toggle).await? else {
            return Ok(false);
        };
        session.scroll_into_view(&toggle).await?;
        session.force_click(&toggle).await?;
        self.pacing.settle().await;
        Ok(true)
    }

    async fn collect_locations<S: BrowsingSession>(
        &self,
        session: &mut S,
        name: &str,
        criteria: &SearchCriteria,
        status: &StatusReporter,
    ) -> CrawlResult<Vec<Record>> {
        match self.expand_locations(session).await {
            Ok(expanded) => debug!("Location toggle for {}: {}", name, expanded),
            Err(e) => status.report(format!("Error expanding locations: {}", e)),
        }

        let rows = session.find_all(&self.profile.location_rows).await?;
        let mut records = Vec::new();
        for row in &rows {
            let fields = match self.read_location(session, row).await {
                Ok(fields) => fields,
                Err(e) => {
                    status.report(format!("Error extracting location details: {}", e));
                    continue;
                }
            };
            match fields.into_record(name, criteria, &self.profile.province) {
                Some(record) => {
                    status.report(format!("Found: {}", record));
                    records.push(record);
                }
                None => debug!("Location of {} is outside {}", name, criteria.city),
            }
        }
        Ok(records)
    }

    async fn read_location<S: BrowsingSession>(
        &self,
        session: &mut S,
        row: &S::Element,
    ) -> CrawlResult<LocationFields> {
        let p = &*self.profile;
        let business_name = match session.find_within(row, &p.location_business_name).await? {
            Some(el) => session.text(&el).await?.trim().to_string(),
            None => String::new(),
        };

        let address = session
            .find_within(row, &p.location_address)
            .await?
            .ok_or_else(|| CrawlError::ElementNotFound(p.location_address.to_string()))?;
        let mut parts = Vec::new();
        for span in session.find_all_within(&address, &p.address_parts).await? {
            parts.push(session.text(&span).await?);
        }

        Ok(LocationFields {
            business_name,
            parts,
        })
    }

    /// Navigate back to the list view from `depth` and assert it is showing.
    pub async fn return_to_list<S: BrowsingSession>(
        &self,
        session: &mut S,
        depth: ViewDepth,
    ) -> CrawlResult<()> {
        let p = &*self.profile;
        let timeout = self.pacing.wait_timeout;
        for step in (0..depth.steps_to_list()).rev() {
            session.back().await?;
            // Intermediate step lands on the detail view
            if step > 0 {
                session.wait_until_present(&p.detail_container, timeout).await?;
                self.pacing.settle().await;
            }
        }
        session.wait_until_present(&p.list_rows, timeout).await?;
        self.pacing.settle().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::memory::{Listing, Location, MemoryDirectory, MemorySession};
    use crate::status::TracingObserver;

    fn criteria() -> SearchCriteria {
        SearchCriteria::new("Oakville", "IV Sedation", 10).unwrap()
    }

    async fn run(listing: Listing) -> (Evaluation, MemorySession) {
        let profile = Arc::new(SiteProfile::default());
        let mut session = MemorySession::new(
            Arc::new(MemoryDirectory::new(vec![vec![listing]])),
            profile.clone(),
        );
        let pipeline = RecordFilterPipeline::new(profile.clone(), Pacing::immediate());
        let status = StatusReporter::new(None, Arc::new(TracingObserver));

        session.open("https://example.test").await.unwrap();
        let entry = session.find(&profile.list_rows).await.unwrap().unwrap();
        let eval = pipeline
            .evaluate(&mut session, &entry, &criteria(), &status)
            .await;
        pipeline
            .return_to_list(&mut session, eval.depth)
            .await
            .unwrap();
        (eval, session)
    }

    fn fields(parts: &[&str]) -> LocationFields {
        LocationFields {
            business_name: "Smile Clinic".to_string(),
            parts: parts.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_city_filter_is_case_insensitive() {
        let criteria = criteria();
        assert!(fields(&["1 Main St", "Mississauga, ON", "L5B 1M2"])
            .into_record("Dr. A", &criteria, "ON")
            .is_none());

        let record = fields(&["1 Main St", "oakville, ON", "L6J 1A1"])
            .into_record("Dr. A", &criteria, "ON")
            .unwrap();
        assert_eq!(record.address, "1 Main St");
        assert_eq!(record.city, "Oakville ON L6J 1A1");
    }

    #[test]
    fn test_short_address_keeps_record_without_city() {
        let record = fields(&["PO Box 12"])
            .into_record("Dr. A", &criteria(), "ON")
            .unwrap();
        assert_eq!(record.address, "");
        assert_eq!(record.city, "");
        assert_eq!(record.business_name, "Smile Clinic");
    }

    #[tokio::test]
    async fn test_category_rejects_regardless_of_value() {
        let (eval, _) = run(Listing::new("Dr. A").with_category("")).await;
        assert!(matches!(eval.verdict, Verdict::Rejected(Rejection::Category(_))));
        assert_eq!(eval.depth, ViewDepth::Detail);
    }

    #[tokio::test]
    async fn test_missing_primary_section_rejects() {
        let (eval, _) = run(Listing::new("Dr. B").without_primary_section()).await;
        assert!(matches!(
            eval.verdict,
            Verdict::Rejected(Rejection::NoPrimarySection)
        ));
    }

    #[tokio::test]
    async fn test_sub_detail_gate_asymmetry() {
        let location = Location::new(Some("Clinic"), &["1 Main St", "Oakville, ON", "L6J 1A1"]);

        let (eval, _) = run(Listing::new("No link").with_location(location.clone())).await;
        assert_eq!(eval.records().len(), 1);

        let (eval, _) = run(Listing::new("No attribute")
            .with_sub_detail(None)
            .with_location(location.clone()))
        .await;
        assert!(matches!(
            eval.verdict,
            Verdict::Rejected(Rejection::SecondaryMissing)
        ));
        assert_eq!(eval.depth, ViewDepth::SubDetail);

        let (eval, _) = run(Listing::new("Mismatch")
            .with_sub_detail(Some("Oral Sedation"))
            .with_location(location.clone()))
        .await;
        assert!(matches!(
            eval.verdict,
            Verdict::Rejected(Rejection::SecondaryMismatch(_))
        ));

        let (eval, _) = run(Listing::new("Match")
            .with_sub_detail(Some("Deep IV Sedation / General Anaesthesia"))
            .with_location(location))
        .await;
        assert_eq!(eval.records().len(), 1);
        assert_eq!(eval.depth, ViewDepth::Detail);
    }

    #[tokio::test]
    async fn test_slow_detail_after_sub_detail_returns_one_step() {
        let (eval, session) = run(Listing::new("Dr. Slow")
            .with_sub_detail(Some("IV Sedation"))
            .slow_after_sub_detail()
            .with_location(Location::new(Some("Clinic"), &["1 Main St", "Oakville, ON", "L6J 1A1"])))
        .await;

        assert!(matches!(eval.verdict, Verdict::Faulted(_)));
        assert_eq!(eval.depth, ViewDepth::Detail);
        let backs = session
            .actions()
            .iter()
            .filter(|a| **a == crate::session::memory::SessionAction::Back)
            .count();
        assert_eq!(backs, 2);
    }

    #[tokio::test]
    async fn test_collapsed_locations_are_expanded() {
        let (eval, session) = run(Listing::new("Dr. C")
            .collapsible()
            .with_location(Location::new(Some("North"), &["1 North Rd", "Oakville, ON", "L6H 1A1"]))
            .with_location(Location::new(None, &["2 South Rd", "Oakville ON", "L6K 2B2"])))
        .await;

        let records = eval.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].business_name, "");
        assert!(session
            .actions()
            .contains(&crate::session::memory::SessionAction::ForcedClick("toggle".to_string())));
    }

    #[tokio::test]
    async fn test_location_without_address_is_skipped() {
        let (eval, _) = run(Listing::new("Dr. D")
            .with_location(Location::without_address(Some("Nowhere")))
            .with_location(Location::new(Some("Here"), &["3 Lake St", "Oakville, ON", "L6J 3C3"])))
        .await;
        let records = eval.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].business_name, "Here");
    }

    #[tokio::test]
    async fn test_malformed_entry_is_faulted_with_raw_markup() {
        let (eval, _) = run(Listing::malformed()).await;
        match eval.verdict {
            Verdict::Faulted(CrawlError::EntryParse { raw, .. }) => {
                assert!(raw.unwrap().contains("row"));
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
        assert_eq!(eval.depth, ViewDepth::List);
    }
}
