//! Everything written at the end of a batch: the CSV file, the map or list
//! page, and the console summary.

pub mod csv;
pub mod list;
pub mod map;
pub mod summary;

use self::csv::write_csv;
use self::list::render_list;
use self::map::{render_map, MapOptions};
use crate::config::{MapMode, OutputConfig};
use crate::models::ListingRecord;
use crate::normalize::PriceTiers;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Map,
    List,
}

/// The map needs at least one located record; otherwise, or when asked,
/// fall back to the list.
pub fn choose_view(mode: MapMode, records: &[ListingRecord]) -> View {
    if mode == MapMode::List || !records.iter().any(ListingRecord::has_coordinates) {
        View::List
    } else {
        View::Map
    }
}

/// Listing links are only rendered for absolute http(s) URLs
pub(crate) fn is_web_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[derive(Debug)]
pub struct WrittenOutputs {
    pub csv: PathBuf,
    pub view: View,
    pub view_path: PathBuf,
}

pub fn write_outputs(
    records: &[ListingRecord],
    output: &OutputConfig,
    tiers: &PriceTiers,
) -> Result<WrittenOutputs> {
    let csv_path = PathBuf::from(&output.csv_path);
    write_csv(&csv_path, records, tiers)?;

    let now = chrono::Local::now();
    let view = choose_view(output.map_mode, records);

    let (view_path, page) = match view {
        View::Map => {
            let generated_at = now.format("%m/%d/%Y").to_string();
            let options = MapOptions::from_output(output, *tiers, generated_at);
            (PathBuf::from(&output.map_path), render_map(records, &options))
        }
        View::List => {
            if output.map_mode != MapMode::List {
                tracing::warn!("No listings with coordinates found, creating a list view instead");
            }
            let generated_at = now.format("%Y-%m-%d %H:%M:%S").to_string();
            (PathBuf::from(&output.list_path), render_list(records, &output.title, &generated_at))
        }
    };

    write_page(&view_path, &page)?;
    tracing::info!("{:?} view saved as {}", view, view_path.display());

    Ok(WrittenOutputs {
        csv: csv_path,
        view,
        view_path,
    })
}

fn write_page(path: &Path, page: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, page).with_context(|| format!("Failed to write {}", path.display()))
}
