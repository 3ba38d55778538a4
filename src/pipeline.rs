//! One batch run: scrape every source, normalize, optionally enrich from
//! detail pages, then geocode whatever still lacks coordinates.

use crate::config::DelayRange;
use crate::detail_page;
use crate::geocode::{self, AddressResolver, ResolveStats};
use crate::http_client::PageFetcher;
use crate::models::ListingRecord;
use crate::normalize;
use crate::scraper_trait::ScraperRegistry;
use anyhow::Result;
use std::time::Duration;

#[derive(Debug)]
pub struct BatchOutcome {
    /// Deduplicated, normalized records in first-discovery order
    pub records: Vec<ListingRecord>,
    /// Records found before deduplication
    pub discovered: usize,
    pub enriched: usize,
    pub geocoding: Option<ResolveStats>,
}

pub struct Pipeline<'a> {
    registry: &'a ScraperRegistry,
    max_pages: u32,
    detail_pages: Option<(&'a dyn PageFetcher, DelayRange)>,
    geocoding: Option<(&'a AddressResolver, Duration)>,
}

impl<'a> Pipeline<'a> {
    pub fn new(registry: &'a ScraperRegistry, max_pages: u32) -> Self {
        Self {
            registry,
            max_pages,
            detail_pages: None,
            geocoding: None,
        }
    }

    /// Fetch the detail page of every record still missing coordinates
    pub fn with_detail_pages(mut self, fetcher: &'a dyn PageFetcher, delay: DelayRange) -> Self {
        self.detail_pages = Some((fetcher, delay));
        self
    }

    pub fn with_geocoding(mut self, resolver: &'a AddressResolver, delay: Duration) -> Self {
        self.geocoding = Some((resolver, delay));
        self
    }

    pub async fn run(&self) -> Result<BatchOutcome> {
        let scraped = self.registry.scrape_all(self.max_pages).await?;
        let discovered = scraped.len();

        let mut records = normalize::normalize(scraped);
        tracing::info!("{} unique listings out of {} scraped", records.len(), discovered);

        let enriched = match self.detail_pages {
            Some((fetcher, delay)) => enrich_from_detail_pages(&mut records, fetcher, delay).await,
            None => 0,
        };

        let geocoding = match self.geocoding {
            Some((resolver, delay)) => {
                Some(geocode::resolve_missing(&mut records, resolver, delay).await)
            }
            None => {
                tracing::info!("Geocoding disabled, keeping only coordinates found on the site");
                None
            }
        };

        Ok(BatchOutcome {
            records,
            discovered,
            enriched,
            geocoding,
        })
    }
}

/// Returns how many records gained coordinates
pub async fn enrich_from_detail_pages(
    records: &mut [ListingRecord],
    fetcher: &dyn PageFetcher,
    delay: DelayRange,
) -> usize {
    let mut located = 0;
    let mut first = true;

    for record in records.iter_mut().filter(|r| !r.has_coordinates()) {
        if !first {
            delay.wait().await;
        }
        first = false;

        match fetcher.fetch(&record.url).await {
            Ok(html) => {
                record.enrich_from(&detail_page::parse_detail(&html));
                if record.has_coordinates() {
                    located += 1;
                }
            }
            Err(e) => tracing::warn!("Could not fetch details for {}: {}", record.url, e),
        }
    }

    tracing::info!("Detail pages gave coordinates for {} listings", located);
    located
}
