//! Element locators understood by every session implementation.

use serde::{Deserialize, Serialize};

/// How to find an element on the current view.
///
/// In config files a locator is a plain string: strings starting with `/`
/// or `(` are XPath, `link:` selects an anchor by its visible text, and
/// anything else is a CSS selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Locator {
    Css(String),
    XPath(String),
    LinkText(String),
}

const LINK_PREFIX: &str = "link:";

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    pub fn link_text(text: impl Into<String>) -> Self {
        Locator::LinkText(text.into())
    }

    /// Parse the string form used in config files.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("locator must not be empty".to_string());
        }
        if let Some(text) = raw.strip_prefix(LINK_PREFIX) {
            let text = text.trim();
            if text.is_empty() {
                return Err("link locator needs link text".to_string());
            }
            return Ok(Locator::LinkText(text.to_string()));
        }
        if raw.starts_with('/') || raw.starts_with('(') {
            return Ok(Locator::XPath(raw.to_string()));
        }
        Ok(Locator::Css(raw.to_string()))
    }

    /// Equivalent XPath expression, for backends that cannot match link text natively.
    pub fn to_xpath(&self) -> Option<String> {
        match self {
            Locator::Css(_) => None,
            Locator::XPath(expr) => Some(expr.clone()),
            Locator::LinkText(text) => Some(format!(
                "//a[normalize-space(.)={}]",
                xpath_literal(text)
            )),
        }
    }
}

/// Quote a string as an XPath literal, handling embedded quotes.
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    let parts: Vec<String> = text.split('\'').map(|p| format!("'{}'", p)).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

impl TryFrom<String> for Locator {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Locator::parse(&value)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(s) | Locator::XPath(s) => f.write_str(s),
            Locator::LinkText(text) => write!(f, "{}{}", LINK_PREFIX, text),
        }
    }
}

impl prefer::FromValue for Locator {
    fn from_value(value: &prefer::ConfigValue) -> prefer::Result<Self> {
        match value.as_str() {
            Some(raw) => Locator::parse(raw).map_err(|e| prefer::Error::ConversionError {
                key: String::new(),
                type_name: "Locator".to_string(),
                source: e.into(),
            }),
            None => Err(prefer::Error::ConversionError {
                key: String::new(),
                type_name: "Locator".to_string(),
                source: "expected string".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        assert_eq!(
            Locator::parse("div#results .row").unwrap(),
            Locator::css("div#results .row")
        );
        assert_eq!(
            Locator::parse("//h3[text()=\"Primary Practice\"]").unwrap(),
            Locator::xpath("//h3[text()=\"Primary Practice\"]")
        );
        assert_eq!(
            Locator::parse("link: View Facility Permits").unwrap(),
            Locator::link_text("View Facility Permits")
        );
        assert!(Locator::parse("   ").is_err());
        assert!(Locator::parse("link:").is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for locator in [
            Locator::css("h2 a"),
            Locator::xpath("(//a)[1]"),
            Locator::link_text("Next"),
        ] {
            assert_eq!(Locator::parse(&locator.to_string()).unwrap(), locator);
        }
    }

    #[test]
    fn test_link_text_to_xpath() {
        let xpath = Locator::link_text("View Facility Permits").to_xpath().unwrap();
        assert_eq!(xpath, "//a[normalize-space(.)='View Facility Permits']");

        let quoted = Locator::link_text("Dr. O'Neil").to_xpath().unwrap();
        assert_eq!(quoted, "//a[normalize-space(.)=\"Dr. O'Neil\"]");

        assert!(Locator::css("h2").to_xpath().is_none());
    }
}
