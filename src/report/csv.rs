use crate::models::ListingRecord;
use crate::normalize::PriceTiers;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;

pub const HEADERS: [&str; 9] = [
    "title",
    "url",
    "address",
    "latitude",
    "longitude",
    "price",
    "price_tier",
    "info",
    "description",
];

pub fn write_csv(path: &Path, records: &[ListingRecord], tiers: &PriceTiers) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_records(file, records, tiers)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!("Saved {} listings to {}", records.len(), path.display());
    Ok(())
}

/// One header row, then one row per record; missing coordinates are empty cells
pub fn write_records<W: io::Write>(
    writer: W,
    records: &[ListingRecord],
    tiers: &PriceTiers,
) -> Result<()> {
    let mut wtr = ::csv::Writer::from_writer(writer);
    wtr.write_record(HEADERS)?;

    for record in records {
        let (latitude, longitude) = match record.coordinates {
            Some(c) => (c.latitude.to_string(), c.longitude.to_string()),
            None => (String::new(), String::new()),
        };

        wtr.write_record([
            record.title.as_str(),
            record.url.as_str(),
            record.address.as_str(),
            latitude.as_str(),
            longitude.as_str(),
            record.price.to_string().as_str(),
            tiers.classify(&record.price).to_string().as_str(),
            record.info().as_str(),
            record.description.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, Price};

    #[test]
    fn test_rows_follow_header_columns() {
        let mut located = ListingRecord::new("https://www.kijiji.ca/v/1");
        located.title = "Bright, quiet 2 bedroom".to_string();
        located.price = Price::Amount(950.0);
        located.coordinates = Some(Coordinates::new(47.5615, -52.7126));
        located.attributes.insert("Bedrooms".to_string(), "2".to_string());
        let unlocated = ListingRecord::new("https://www.kijiji.ca/v/2");

        let mut buffer = Vec::new();
        write_records(&mut buffer, &[located, unlocated], &PriceTiers::default()).unwrap();

        let mut reader = ::csv::Reader::from_reader(buffer.as_slice());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(headers, HEADERS);

        let rows: Vec<::csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "Bright, quiet 2 bedroom");
        assert_eq!(&rows[0][3], "47.5615");
        assert_eq!(&rows[0][5], "$950");
        assert_eq!(&rows[0][6], "mid");
        assert_eq!(&rows[0][7], "Bedrooms: 2");
        assert_eq!(&rows[1][3], "");
        assert_eq!(&rows[1][5], "Not available");
        assert_eq!(&rows[1][6], "unknown");
    }
}
