use crate::models::ListingRecord;
use crate::normalize::{PriceTier, PriceTiers, BEDROOMS};
use std::collections::BTreeMap;
use std::fmt;

/// Console report over a finished batch
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total: usize,
    pub with_coordinates: usize,
    pub average_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub tiers: BTreeMap<PriceTier, usize>,
    pub bedrooms: BTreeMap<String, usize>,
    labels: BTreeMap<PriceTier, String>,
}

impl Summary {
    pub fn from_records(records: &[ListingRecord], price_tiers: &PriceTiers) -> Self {
        let prices: Vec<f64> = records.iter().filter_map(|r| r.price.amount()).collect();

        let average_price = if prices.is_empty() {
            None
        } else {
            Some(prices.iter().sum::<f64>() / prices.len() as f64)
        };
        let min_price = prices.iter().copied().reduce(f64::min);
        let max_price = prices.iter().copied().reduce(f64::max);

        let mut tiers = BTreeMap::new();
        for record in records {
            *tiers.entry(price_tiers.classify(&record.price)).or_insert(0) += 1;
        }

        let mut bedrooms = BTreeMap::new();
        for beds in records.iter().filter_map(|r| r.attributes.get(BEDROOMS)) {
            *bedrooms.entry(beds.clone()).or_insert(0) += 1;
        }

        Self {
            total: records.len(),
            with_coordinates: records.iter().filter(|r| r.has_coordinates()).count(),
            average_price,
            min_price,
            max_price,
            tiers,
            bedrooms,
            labels: PriceTier::ALL.iter().map(|t| (*t, price_tiers.label(*t))).collect(),
        }
    }

    pub fn coverage_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.with_coordinates as f64 / self.total as f64 * 100.0
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{}", rule)?;
        writeln!(f, "RENTAL SCRAPING SUMMARY REPORT")?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "Total listings found: {}", self.total)?;
        writeln!(f, "Listings with coordinates: {}", self.with_coordinates)?;
        if self.total > 0 {
            writeln!(f, "Coordinates available: {:.1}%", self.coverage_percent())?;
        }

        if let (Some(average), Some(min), Some(max)) =
            (self.average_price, self.min_price, self.max_price)
        {
            writeln!(f)?;
            writeln!(f, "Price Analysis:")?;
            writeln!(f, "  Average price: ${:.0}", average)?;
            writeln!(f, "  Minimum price: ${:.0}", min)?;
            writeln!(f, "  Maximum price: ${:.0}", max)?;
        }

        if !self.tiers.is_empty() {
            writeln!(f)?;
            writeln!(f, "Price Distribution:")?;
            for (tier, count) in &self.tiers {
                let label = self.labels.get(tier).map(String::as_str).unwrap_or_default();
                writeln!(f, "  {}: {} listings", label, count)?;
            }
        }

        if !self.bedrooms.is_empty() {
            writeln!(f)?;
            writeln!(f, "Bedroom Distribution:")?;
            for (beds, count) in &self.bedrooms {
                writeln!(f, "  {} bedrooms: {} listings", beds, count)?;
            }
        }

        write!(f, "{}", rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, Price};

    fn record(url: &str, price: Price, beds: Option<&str>) -> ListingRecord {
        let mut r = ListingRecord::new(url);
        r.price = price;
        if let Some(beds) = beds {
            r.attributes.insert(BEDROOMS.to_string(), beds.to_string());
        }
        r
    }

    #[test]
    fn test_price_statistics_and_distributions() {
        let mut located = record("a", Price::Amount(700.0), Some("1"));
        located.coordinates = Some(Coordinates::new(47.5, -52.7));
        let records = vec![
            located,
            record("b", Price::Amount(1000.0), Some("2")),
            record("c", Price::Amount(1300.0), Some("2")),
            record("d", Price::Unavailable, None),
        ];

        let summary = Summary::from_records(&records, &PriceTiers::default());
        assert_eq!(summary.total, 4);
        assert_eq!(summary.with_coordinates, 1);
        assert_eq!(summary.coverage_percent(), 25.0);
        assert_eq!(summary.average_price, Some(1000.0));
        assert_eq!(summary.min_price, Some(700.0));
        assert_eq!(summary.max_price, Some(1300.0));
        assert_eq!(summary.tiers.get(&PriceTier::Low), Some(&1));
        assert_eq!(summary.tiers.get(&PriceTier::Unknown), Some(&1));
        assert_eq!(summary.bedrooms.get("2"), Some(&2));

        let text = summary.to_string();
        assert!(text.contains("Coordinates available: 25.0%"));
        assert!(text.contains("Average price: $1000"));
        assert!(text.contains("$800 - $1200: 1 listings"));
        assert!(text.contains("2 bedrooms: 2 listings"));
    }

    #[test]
    fn test_empty_batch() {
        let summary = Summary::from_records(&[], &PriceTiers::default());
        assert_eq!(summary.average_price, None);
        assert!(summary.tiers.is_empty());
        assert!(!summary.to_string().contains("Price Analysis"));
    }
}
