//! Per-field flat files: one text file per column, one line per listing,
//! line N of every file describing the same listing.

use crate::models::{Coordinates, ListingRecord, Price, PRICE_NOT_AVAILABLE};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ADDRESS_FILE: &str = "Rental place address.txt";
pub const PRICE_FILE: &str = "Rental place price.txt";
pub const HREF_FILE: &str = "Rental place href.txt";
pub const ROOMS_FILE: &str = "Room numbers.txt";
pub const TITLE_FILE: &str = "Post title.txt";
pub const COORDINATES_FILE: &str = "Rental place coordinates.txt";

#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file} has {found} lines, expected {expected}")]
    LineCountMismatch {
        file: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("line {line} of the coordinates file is not 'lat,lon': {value:?}")]
    InvalidCoordinates { line: usize, value: String },
}

fn read_lines(dir: &Path, file: &'static str) -> Result<Vec<String>, LegacyError> {
    let path = dir.join(file);
    let content = fs::read_to_string(&path).map_err(|source| LegacyError::Io { path, source })?;
    Ok(content.lines().map(|l| l.trim_end_matches('\r').to_string()).collect())
}

fn check_len(file: &'static str, lines: &[String], expected: usize) -> Result<(), LegacyError> {
    if lines.len() == expected {
        Ok(())
    } else {
        Err(LegacyError::LineCountMismatch {
            file,
            expected,
            found: lines.len(),
        })
    }
}

fn parse_coordinates(line: usize, value: &str) -> Result<Option<Coordinates>, LegacyError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }

    let invalid = || LegacyError::InvalidCoordinates {
        line,
        value: value.to_string(),
    };
    let (lat, lon) = value.split_once(',').ok_or_else(invalid)?;
    let latitude = lat.trim().parse::<f64>().map_err(|_| invalid())?;
    let longitude = lon.trim().parse::<f64>().map_err(|_| invalid())?;

    let coordinates = Coordinates::new(latitude, longitude);
    if coordinates.is_valid() {
        Ok(Some(coordinates))
    } else {
        Err(invalid())
    }
}

/// Rebuild records from a directory of flat files. The coordinates file is
/// optional; every file present must have as many lines as the href file.
/// Rows with a blank href are skipped.
pub fn read_legacy_dir(dir: &Path) -> Result<Vec<ListingRecord>, LegacyError> {
    let hrefs = read_lines(dir, HREF_FILE)?;
    let expected = hrefs.len();

    let addresses = read_lines(dir, ADDRESS_FILE)?;
    check_len(ADDRESS_FILE, &addresses, expected)?;
    let prices = read_lines(dir, PRICE_FILE)?;
    check_len(PRICE_FILE, &prices, expected)?;
    let rooms = read_lines(dir, ROOMS_FILE)?;
    check_len(ROOMS_FILE, &rooms, expected)?;
    let titles = read_lines(dir, TITLE_FILE)?;
    check_len(TITLE_FILE, &titles, expected)?;

    let coordinates = if dir.join(COORDINATES_FILE).exists() {
        let lines = read_lines(dir, COORDINATES_FILE)?;
        check_len(COORDINATES_FILE, &lines, expected)?;
        lines
            .iter()
            .enumerate()
            .map(|(i, value)| parse_coordinates(i + 1, value))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        vec![None; expected]
    };

    let records = (0..expected)
        .filter_map(|i| {
            let href = hrefs[i].trim();
            if href.is_empty() {
                tracing::warn!("Skipping line {} of {}: no listing URL", i + 1, HREF_FILE);
                return None;
            }

            let mut record = ListingRecord::new(href);
            if !titles[i].trim().is_empty() {
                record.title = titles[i].trim().to_string();
            }
            if !addresses[i].trim().is_empty() {
                record.address = addresses[i].trim().to_string();
            }
            let price = prices[i].trim();
            if !price.is_empty() && price != PRICE_NOT_AVAILABLE {
                record.price = Price::Listed(price.to_string());
            }
            record.attributes = ListingRecord::parse_info(&rooms[i]);
            record.coordinates = coordinates[i];
            Some(record)
        })
        .collect::<Vec<_>>();

    tracing::info!("Read {} listings from {}", records.len(), dir.display());
    Ok(records)
}

/// Write one file per field; a listing without coordinates gets an empty
/// line in the coordinates file.
pub fn write_legacy_dir(dir: &Path, records: &[ListingRecord]) -> Result<(), LegacyError> {
    fs::create_dir_all(dir).map_err(|source| LegacyError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let columns: [(&str, fn(&ListingRecord) -> String); 6] = [
        (ADDRESS_FILE, |r: &ListingRecord| r.address.clone()),
        (PRICE_FILE, |r: &ListingRecord| r.price.to_string()),
        (HREF_FILE, |r: &ListingRecord| r.url.clone()),
        (ROOMS_FILE, |r: &ListingRecord| r.info()),
        (TITLE_FILE, |r: &ListingRecord| r.title.clone()),
        (COORDINATES_FILE, |r: &ListingRecord| {
            r.coordinates
                .map(|c| format!("{},{}", c.latitude, c.longitude))
                .unwrap_or_default()
        }),
    ];

    for (file, field) in &columns {
        let mut content = String::new();
        for record in records {
            content.push_str(&single_line(&field(record)));
            content.push('\n');
        }

        let path = dir.join(file);
        fs::write(&path, content).map_err(|source| LegacyError::Io { path, source })?;
    }

    tracing::info!("Wrote {} listings as flat files to {}", records.len(), dir.display());
    Ok(())
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("rentmap-legacy-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write(dir: &Path, file: &str, lines: &[&str]) {
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(dir.join(file), content).unwrap();
    }

    fn seed(dir: &Path) {
        write(dir, HREF_FILE, &["https://www.kijiji.ca/v/1", "https://www.kijiji.ca/v/2"]);
        write(dir, ADDRESS_FILE, &["5 Water St, St. John's, NL", "No address"]);
        write(dir, PRICE_FILE, &["$950.00", "Please contact"]);
        write(dir, ROOMS_FILE, &["Bedrooms: 2 *** Bathrooms: 1", ""]);
        write(dir, TITLE_FILE, &["Bright 2 bedroom", "Room for rent"]);
    }

    #[test]
    fn test_reads_rows_across_files() {
        let dir = scratch_dir("read");
        seed(&dir);
        write(&dir, COORDINATES_FILE, &["47.5615,-52.7126", ""]);

        let records = read_legacy_dir(&dir).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Bright 2 bedroom");
        assert_eq!(records[0].price, Price::Listed("$950.00".to_string()));
        assert_eq!(records[0].attributes.get("Bathrooms").map(String::as_str), Some("1"));
        assert_eq!(records[0].coordinates, Some(Coordinates::new(47.5615, -52.7126)));
        assert_eq!(records[1].price, Price::Listed("Please contact".to_string()));
        assert!(!records[1].has_address());
        assert!(records[1].coordinates.is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_line_count_mismatch() {
        let dir = scratch_dir("mismatch");
        seed(&dir);
        write(&dir, PRICE_FILE, &["$950.00"]);

        match read_legacy_dir(&dir) {
            Err(LegacyError::LineCountMismatch { file, expected, found }) => {
                assert_eq!(file, PRICE_FILE);
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("expected a line count mismatch, got {:?}", other),
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bad_coordinates_line() {
        let dir = scratch_dir("coords");
        seed(&dir);
        write(&dir, COORDINATES_FILE, &["47.5615,-52.7126", "somewhere"]);

        assert!(matches!(
            read_legacy_dir(&dir),
            Err(LegacyError::InvalidCoordinates { line: 2, .. })
        ));

        write(&dir, COORDINATES_FILE, &["NaN,-52.7126", ""]);
        assert!(matches!(
            read_legacy_dir(&dir),
            Err(LegacyError::InvalidCoordinates { line: 1, .. })
        ));

        write(&dir, COORDINATES_FILE, &["", "47.5615,999"]);
        assert!(matches!(
            read_legacy_dir(&dir),
            Err(LegacyError::InvalidCoordinates { line: 2, .. })
        ));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_blank_href_rows_are_skipped() {
        let dir = scratch_dir("blank-href");
        write(&dir, HREF_FILE, &["https://x/1", "", "https://x/3"]);
        write(&dir, ADDRESS_FILE, &["1 Water St", "2 Water St", "3 Water St"]);
        write(&dir, PRICE_FILE, &["$900", "$950", "$1,000"]);
        write(&dir, ROOMS_FILE, &["", "", ""]);
        write(&dir, TITLE_FILE, &["one", "two", "three"]);

        let records = read_legacy_dir(&dir).unwrap();
        let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x/1", "https://x/3"]);
        assert_eq!(records[1].title, "three");
        assert_eq!(records[1].address, "3 Water St");
        assert!(records.iter().all(|r| !r.url.is_empty()));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_written_files_read_back() {
        let dir = scratch_dir("write");
        let mut first = ListingRecord::new("https://www.kijiji.ca/v/1");
        first.title = "Two lines\nof title".to_string();
        first.price = Price::Amount(950.0);
        first.coordinates = Some(Coordinates::new(47.5615, -52.7126));
        first.attributes.insert("Bedrooms".to_string(), "2".to_string());
        let second = ListingRecord::new("https://www.kijiji.ca/v/2");

        write_legacy_dir(&dir, &[first, second]).unwrap();
        let records = read_legacy_dir(&dir).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Two lines of title");
        assert_eq!(records[0].price, Price::Listed("$950".to_string()));
        assert_eq!(records[0].coordinates, Some(Coordinates::new(47.5615, -52.7126)));
        assert_eq!(records[0].attributes.get("Bedrooms").map(String::as_str), Some("2"));
        assert_eq!(records[1].price, Price::Unavailable);
        assert!(records[1].coordinates.is_none());

        let _ = fs::remove_dir_all(&dir);
    }
}
