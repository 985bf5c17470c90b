//! Site profile: the list URL and every selector the crawl engine uses.
//!
//! Defaults describe the RCDSO "find a dentist" directory.

use serde::{Deserialize, Serialize};

use crate::session::Locator;

/// Default list URL; `{city}` is replaced with the URL-encoded search city.
pub const DEFAULT_LIST_URL: &str = "https://www.rcdso.org/find-a-dentist/search-results?Alpha=&City={city}&MbrSpecialty=&ConstitID=&AlphaParent=&Address1=&PhoneNum=&SedationType=&SedationProviderType=&GroupCode=&DetailsCode=";

/// Selectors and URL template for one directory site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    /// List URL template with a `{city}` placeholder.
    pub list_url: String,
    /// Province token placed between the city and postal code.
    pub province: String,

    /// One row per entry on a list page.
    pub list_rows: Locator,
    /// Entry name, relative to a list row.
    pub entry_name: Locator,
    /// Link into the detail view, relative to a list row.
    pub entry_link: Locator,

    /// Present whenever a detail view is loaded.
    pub detail_container: Locator,
    /// Disqualifying category attribute. Its presence alone rejects an entry.
    pub category: Locator,
    /// Required section header.
    pub primary_section: Locator,
    /// Optional link into the sub-detail view.
    pub sub_detail_link: Locator,
    /// Nested attribute on the sub-detail view.
    pub nested_attribute: Locator,

    /// Toggle that expands the full location list.
    pub locations_toggle: Locator,
    pub location_rows: Locator,
    /// Relative to a location row.
    pub location_business_name: Locator,
    /// Relative to a location row.
    pub location_address: Locator,
    /// Relative to the address block: street, locality, postal code.
    pub address_parts: Locator,

    pub next_control: Locator,
    pub previous_control: Locator,
    /// Last page link, found through the pagination ellipsis.
    pub jump_to_end: Locator,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            list_url: DEFAULT_LIST_URL.to_string(),
            province: "ON".to_string(),
            list_rows: Locator::css("div#dentistSearchResults .row"),
            entry_name: Locator::css("h2"),
            entry_link: Locator::css("h2 a"),
            detail_container: Locator::css("div#dentistDetails"),
            category: Locator::xpath("//dt[text()=\"Specialty:\"]/following-sibling::dd"),
            primary_section: Locator::xpath("//h3[text()=\"Primary Practice\"]"),
            sub_detail_link: Locator::link_text("View Facility Permits"),
            nested_attribute: Locator::xpath(
                "//dt[contains(text(), \"Highest Level Of Sedation\")]/following-sibling::dd",
            ),
            locations_toggle: Locator::xpath("//a[@data-collapsible-toggle]"),
            location_rows: Locator::css("div[data-collapsible-toggled] .row"),
            location_business_name: Locator::css("h6"),
            location_address: Locator::css("address"),
            address_parts: Locator::css("span"),
            next_control: Locator::xpath("//a[@class=\"page-link next\"]"),
            previous_control: Locator::xpath("//a[@class=\"page-link prev\"]"),
            jump_to_end: Locator::xpath(
                "//span[@class=\"page-link\" and text()=\"...\"]/parent::li/following-sibling::li/a",
            ),
        }
    }
}

impl SiteProfile {
    /// Build the list URL for a search city.
    pub fn list_url_for(&self, city: &str) -> String {
        self.list_url
            .replace("{city}", urlencoding::encode(city).as_ref())
    }

    /// Check that the list URL template is usable.
    pub fn validate(&self) -> Result<(), String> {
        if !self.list_url.contains("{city}") {
            return Err(format!(
                "list_url must contain a {{city}} placeholder: {}",
                self.list_url
            ));
        }
        url::Url::parse(&self.list_url_for("probe"))
            .map_err(|e| format!("list_url is not a valid URL: {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_url_encodes_city() {
        let profile = SiteProfile::default();
        let url = profile.list_url_for("Richmond Hill");
        assert!(url.contains("City=Richmond%20Hill&"));
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_placeholder() {
        let profile = SiteProfile {
            list_url: "https://example.com/search".to_string(),
            ..Default::default()
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let profile: SiteProfile = toml::from_str(
            r#"
            province = "BC"
            sub_detail_link = "link:Permits"
            "#,
        )
        .unwrap();
        assert_eq!(profile.province, "BC");
        assert_eq!(profile.sub_detail_link, Locator::link_text("Permits"));
        assert_eq!(profile.list_rows, SiteProfile::default().list_rows);
    }
}
