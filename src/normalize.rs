use crate::models::{ListingRecord, Price};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Drop every record whose URL was already seen, keeping scan order
pub fn dedupe(records: Vec<ListingRecord>) -> Vec<ListingRecord> {
    let mut seen_urls: HashSet<String> = HashSet::with_capacity(records.len());
    let total = records.len();

    let unique: Vec<ListingRecord> = records
        .into_iter()
        .filter(|record| seen_urls.insert(record.url.clone()))
        .collect();

    if unique.len() < total {
        tracing::debug!("Removed {} duplicate listings", total - unique.len());
    }
    unique
}

/// Parse price text such as "$1,250", "950 $" or "$950.00" into an amount.
///
/// Only the dollar sign, thousands separators and whitespace are removed.
/// Whatever is left must be a single number, so ranges ("$1,100 - $1,300")
/// and prose ("Please contact") yield `None`.
pub fn parse_price(price_text: &str) -> Option<f64> {
    let number: String = price_text
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();

    number.parse::<f64>().ok().filter(|p| p.is_finite() && *p >= 0.0)
}

/// Turn listed price text into an amount when it parses. Amounts and
/// unparsable text come back unchanged, so coercing twice is a no-op.
pub fn coerce_price(price: &Price) -> Price {
    match price {
        Price::Listed(text) => match parse_price(text) {
            Some(amount) => Price::Amount(amount),
            None => price.clone(),
        },
        other => other.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriceTier {
    Low,
    Mid,
    High,
    Unknown,
}

impl PriceTier {
    pub const ALL: [PriceTier; 4] = [
        PriceTier::Low,
        PriceTier::Mid,
        PriceTier::High,
        PriceTier::Unknown,
    ];

    /// Marker color on the map
    pub fn color(&self) -> &'static str {
        match self {
            PriceTier::Low => "green",
            PriceTier::Mid => "orange",
            PriceTier::High => "red",
            PriceTier::Unknown => "blue",
        }
    }
}

impl fmt::Display for PriceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PriceTier::Low => "low",
            PriceTier::Mid => "mid",
            PriceTier::High => "high",
            PriceTier::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Price thresholds: below `low` is the low tier, below `high` the mid tier,
/// anything else the high tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceTiers {
    pub low: f64,
    pub high: f64,
}

impl Default for PriceTiers {
    fn default() -> Self {
        Self {
            low: 800.0,
            high: 1200.0,
        }
    }
}

impl PriceTiers {
    pub fn classify(&self, price: &Price) -> PriceTier {
        match coerce_price(price).amount() {
            Some(amount) if amount < self.low => PriceTier::Low,
            Some(amount) if amount < self.high => PriceTier::Mid,
            Some(_) => PriceTier::High,
            None => PriceTier::Unknown,
        }
    }

    /// Legend text for a tier, e.g. "$800 - $1200"
    pub fn label(&self, tier: PriceTier) -> String {
        match tier {
            PriceTier::Low => format!("Under ${:.0}", self.low),
            PriceTier::Mid => format!("${:.0} - ${:.0}", self.low, self.high),
            PriceTier::High => format!("${:.0} and over", self.high),
            PriceTier::Unknown => "Price unknown".to_string(),
        }
    }
}

pub const BEDROOMS: &str = "Bedrooms";

/// Bedroom count from a title ("2 bedroom", "3 bdrm", "1BR", "Bachelor")
pub fn parse_bedrooms(title: &str) -> Option<String> {
    if title.is_empty() {
        return None;
    }

    if let Ok(count_regex) = Regex::new(r"(?i)\b(\d+)\s*-?\s*(?:bedrooms?|bed|bdrms?|br)\b") {
        if let Some(caps) = count_regex.captures(title) {
            if let Some(num) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
                return Some(num.to_string());
            }
        }
    }

    if let Ok(studio_regex) = Regex::new(r"(?i)\b(?:bachelor|studio)\b") {
        if studio_regex.is_match(title) {
            return Some("Bachelor/Studio".to_string());
        }
    }

    None
}

/// Dedupe, coerce prices and fill the bedroom count from the title when the
/// source did not give one. The order of first occurrences is preserved.
pub fn normalize(records: Vec<ListingRecord>) -> Vec<ListingRecord> {
    dedupe(records)
        .into_iter()
        .map(|mut record| {
            record.price = coerce_price(&record.price);
            if !record.attributes.contains_key(BEDROOMS) {
                if let Some(bedrooms) = parse_bedrooms(&record.title) {
                    record.attributes.insert(BEDROOMS.to_string(), bedrooms);
                }
            }
            record
        })
        .collect()
}
