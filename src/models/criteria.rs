//! Search criteria and quota splitting.

use serde::{Deserialize, Serialize};

use crate::error::{CrawlError, CrawlResult};

/// How a total quota is divided between the forward and backward crawls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QuotaSplit {
    /// `ceil(Q/2)` per direction; the merged result is truncated to `Q`.
    #[default]
    Ceil,
    /// `floor(Q/2)` per direction; an odd remainder is dropped.
    Floor,
}

impl QuotaSplit {
    /// Quota handed to each of the two workers.
    pub fn per_direction(self, quota: usize) -> usize {
        match self {
            QuotaSplit::Ceil => quota.div_ceil(2),
            QuotaSplit::Floor => quota / 2,
        }
    }
}

impl std::fmt::Display for QuotaSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaSplit::Ceil => write!(f, "ceil"),
            QuotaSplit::Floor => write!(f, "floor"),
        }
    }
}

impl prefer::FromValue for QuotaSplit {
    fn from_value(value: &prefer::ConfigValue) -> prefer::Result<Self> {
        match value.as_str() {
            Some("ceil") => Ok(QuotaSplit::Ceil),
            Some("floor") => Ok(QuotaSplit::Floor),
            Some(other) => Err(prefer::Error::ConversionError {
                key: String::new(),
                type_name: "QuotaSplit".to_string(),
                source: format!("unknown quota split: {}", other).into(),
            }),
            None => Err(prefer::Error::ConversionError {
                key: String::new(),
                type_name: "QuotaSplit".to_string(),
                source: "expected string".into(),
            }),
        }
    }
}

/// Immutable parameters of one coordinated crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    /// Search city: used to build the list query and matched against
    /// each location's locality text.
    pub city: String,
    /// Required substring of the nested sub-detail attribute.
    pub secondary_filter: String,
    /// Total records wanted across both directions.
    pub quota: usize,
}

impl SearchCriteria {
    /// Validate user input. Every field is required and the quota must be positive.
    pub fn new(
        city: impl Into<String>,
        secondary_filter: impl Into<String>,
        quota: i64,
    ) -> CrawlResult<Self> {
        let city = city.into().trim().to_string();
        let secondary_filter = secondary_filter.into().trim().to_string();

        if city.is_empty() {
            return Err(CrawlError::Configuration("city must not be empty".into()));
        }
        if secondary_filter.is_empty() {
            return Err(CrawlError::Configuration(
                "secondary filter text must not be empty".into(),
            ));
        }
        if quota <= 0 {
            return Err(CrawlError::Configuration(format!(
                "quota must be a positive integer (got {})",
                quota
            )));
        }

        Ok(Self {
            city,
            secondary_filter,
            quota: quota as usize,
        })
    }

    /// Case-insensitive substring match of the search city against a locality.
    pub fn city_matches(&self, locality: &str) -> bool {
        locality.to_lowercase().contains(&self.city.to_lowercase())
    }

    /// Substring match of the secondary filter against a nested attribute value.
    pub fn secondary_matches(&self, value: &str) -> bool {
        value.contains(&self.secondary_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_quota_is_configuration_error() {
        let err = SearchCriteria::new("Oakville", "General", 0).unwrap_err();
        assert!(matches!(err, CrawlError::Configuration(_)));
    }

    #[test]
    fn test_negative_quota_is_configuration_error() {
        let err = SearchCriteria::new("Oakville", "General", -4).unwrap_err();
        assert!(matches!(err, CrawlError::Configuration(_)));
    }

    #[test]
    fn test_blank_fields_rejected() {
        assert!(SearchCriteria::new("  ", "General", 5).is_err());
        assert!(SearchCriteria::new("Oakville", "", 5).is_err());
    }

    #[test]
    fn test_fields_are_trimmed() {
        let criteria = SearchCriteria::new(" Oakville ", " General ", 5).unwrap();
        assert_eq!(criteria.city, "Oakville");
        assert_eq!(criteria.secondary_filter, "General");
        assert_eq!(criteria.quota, 5);
    }

    #[test]
    fn test_city_match_is_case_insensitive() {
        let criteria = SearchCriteria::new("Oakville", "General", 5).unwrap();
        assert!(criteria.city_matches("Oakville ON"));
        assert!(criteria.city_matches("OAKVILLE, ON"));
        assert!(!criteria.city_matches("Mississauga, ON"));
    }

    #[test]
    fn test_secondary_match_is_substring() {
        let criteria = SearchCriteria::new("Oakville", "Sedation", 5).unwrap();
        assert!(criteria.secondary_matches("Deep Sedation"));
        assert!(!criteria.secondary_matches("General Anaesthesia"));
    }

    #[test]
    fn test_quota_split() {
        assert_eq!(QuotaSplit::Floor.per_direction(7), 3);
        assert_eq!(QuotaSplit::Ceil.per_direction(7), 4);
        assert_eq!(QuotaSplit::Floor.per_direction(1), 0);
        assert_eq!(QuotaSplit::Ceil.per_direction(1), 1);
        assert_eq!(QuotaSplit::Ceil.per_direction(10), 5);
    }
}
