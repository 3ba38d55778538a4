use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const NO_TITLE: &str = "No title";
pub const NO_DESCRIPTION: &str = "No description";
pub const NO_ADDRESS: &str = "No address";
pub const PRICE_NOT_AVAILABLE: &str = "Not available";

/// Separator used when attributes are flattened into a single line
pub const INFO_SEPARATOR: &str = " *** ";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Finite and within WGS84 bounds
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Asking price of a listing.
///
/// Extractors produce `Listed` with the text exactly as the site shows it
/// (e.g. "$1,250"); the normalizer turns parseable text into `Amount`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Price {
    Listed(String),
    Amount(f64),
    Unavailable,
}

impl Price {
    pub fn amount(&self) -> Option<f64> {
        match self {
            Price::Amount(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::Listed(text) => write!(f, "{}", text),
            Price::Amount(value) if value.fract() == 0.0 => write!(f, "${:.0}", value),
            Price::Amount(value) => write!(f, "${:.2}", value),
            Price::Unavailable => write!(f, "{}", PRICE_NOT_AVAILABLE),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub title: String,
    pub url: String,
    pub address: String,
    pub price: Price,
    pub coordinates: Option<Coordinates>,
    pub attributes: BTreeMap<String, String>,
    pub description: String,
}

impl ListingRecord {
    /// Record with every field at its sentinel value
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            title: NO_TITLE.to_string(),
            url: url.into(),
            address: NO_ADDRESS.to_string(),
            price: Price::Unavailable,
            coordinates: None,
            attributes: BTreeMap::new(),
            description: NO_DESCRIPTION.to_string(),
        }
    }

    pub fn has_coordinates(&self) -> bool {
        self.coordinates.is_some()
    }

    pub fn has_address(&self) -> bool {
        let address = self.address.trim();
        !address.is_empty() && address != NO_ADDRESS
    }

    /// Attributes flattened as "Name: value *** Name: value"
    pub fn info(&self) -> String {
        self.attributes
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join(INFO_SEPARATOR)
    }

    /// Parse an "info" line back into attributes. Fragments without a
    /// "Name: value" shape are ignored.
    pub fn parse_info(info: &str) -> BTreeMap<String, String> {
        info.split("***")
            .filter_map(|part| {
                let (name, value) = part.split_once(':')?;
                let name = name.trim();
                let value = value.trim();
                if name.is_empty() || value.is_empty() {
                    None
                } else {
                    Some((name.to_string(), value.to_string()))
                }
            })
            .collect()
    }

    /// Description cut to `max_chars` characters, with an ellipsis when cut
    pub fn short_description(&self, max_chars: usize) -> String {
        if self.description.chars().count() > max_chars {
            let cut: String = self.description.chars().take(max_chars).collect();
            format!("{}...", cut)
        } else {
            self.description.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_uses_sentinels() {
        let record = ListingRecord::new("https://www.kijiji.ca/v-apartments-condos/1");
        assert_eq!(record.title, NO_TITLE);
        assert_eq!(record.address, NO_ADDRESS);
        assert_eq!(record.description, NO_DESCRIPTION);
        assert_eq!(record.price.to_string(), PRICE_NOT_AVAILABLE);
        assert!(!record.has_coordinates());
        assert!(!record.has_address());
    }

    #[test]
    fn test_info_joins_attributes() {
        let mut record = ListingRecord::new("u");
        record.attributes.insert("Bedrooms".to_string(), "2".to_string());
        record.attributes.insert("Bathrooms".to_string(), "1".to_string());
        assert_eq!(record.info(), "Bathrooms: 1 *** Bedrooms: 2");
    }

    #[test]
    fn test_parse_info_skips_garbage() {
        let attrs =
            ListingRecord::parse_info("Bedrooms: 2 *** Not given *** Size (sq ft): 700 *** ");
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get("Bedrooms").map(String::as_str), Some("2"));
        assert_eq!(attrs.get("Size (sq ft)").map(String::as_str), Some("700"));
    }

    #[test]
    fn test_coordinates_validity() {
        assert!(Coordinates::new(47.5615, -52.7126).is_valid());
        assert!(Coordinates::new(-90.0, 180.0).is_valid());
        assert!(!Coordinates::new(f64::NAN, -52.7).is_valid());
        assert!(!Coordinates::new(47.5, f64::INFINITY).is_valid());
        assert!(!Coordinates::new(91.0, -52.7).is_valid());
        assert!(!Coordinates::new(47.5, 999.0).is_valid());
    }

    #[test]
    fn test_price_display() {
        assert_eq!(Price::Amount(950.0).to_string(), "$950");
        assert_eq!(Price::Amount(950.5).to_string(), "$950.50");
        assert_eq!(Price::Listed("Please contact".to_string()).to_string(), "Please contact");
    }

    #[test]
    fn test_short_description_is_char_safe() {
        let mut record = ListingRecord::new("u");
        record.description = "é".repeat(10);
        assert_eq!(record.short_description(3), "ééé...");
        assert_eq!(record.short_description(20), "é".repeat(10));
    }
}
