//! Extracted directory record.

use serde::{Deserialize, Serialize};

/// One accepted practitioner location.
///
/// Identity is structural: two records are the same record when all four
/// fields are equal, regardless of which crawl direction found them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Business Name")]
    pub business_name: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "City")]
    pub city: String,
}

impl Record {
    pub fn new(
        name: impl Into<String>,
        business_name: impl Into<String>,
        address: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            business_name: business_name.into(),
            address: address.into(),
            city: city.into(),
        }
    }

    /// Column headers in output order.
    pub const COLUMNS: [&'static str; 4] = ["Name", "Business Name", "Address", "City"];
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}",
            self.name, self.business_name, self.address, self.city
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_structural() {
        let a = Record::new("Dr. A", "Smile Co", "1 Main St", "Oakville ON L6J 1A1");
        let b = Record::new("Dr. A", "Smile Co", "1 Main St", "Oakville ON L6J 1A1");
        let c = Record::new("Dr. A", "Smile Co", "2 Main St", "Oakville ON L6J 1A1");

        assert_eq!(a, a.clone());
        assert_eq!(a, b);
        assert_eq!(b, a);
        assert_ne!(a, c);
    }

    #[test]
    fn test_serializes_with_spreadsheet_headers() {
        let record = Record::new("Dr. A", "", "1 Main St", "");
        let json = serde_json::to_value(&record).unwrap();
        for column in Record::COLUMNS {
            assert!(json.get(column).is_some(), "missing column {}", column);
        }
    }
}
