//! Walks the result pages of one search source, in order, one at a time.

use crate::config::{DelayRange, ExtractionStrategy, SearchSource};
use crate::detail_page;
use crate::http_client::{is_captcha_page, PageFetcher};
use crate::json_ld;
use crate::models::ListingRecord;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Fetching { page: u32 },
    Done(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The page produced no listings at all
    EmptyPage { page: u32 },
    /// Every listing on the page was already seen (sites often repeat their
    /// last page for out-of-range page numbers)
    NoNewListings { page: u32 },
    FetchFailed { page: u32 },
    PageLimit { pages: u32 },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EmptyPage { page } => write!(f, "empty page {}", page),
            StopReason::NoNewListings { page } => write!(f, "no new listings on page {}", page),
            StopReason::FetchFailed { page } => write!(f, "failed fetch of page {}", page),
            StopReason::PageLimit { pages } => write!(f, "page limit ({} pages)", pages),
        }
    }
}

/// Transition after a page has been fetched and parsed
pub fn next_state(page: u32, found: usize, new: usize, limit: u32) -> DriverState {
    if found == 0 {
        DriverState::Done(StopReason::EmptyPage { page })
    } else if new == 0 {
        DriverState::Done(StopReason::NoNewListings { page })
    } else if page >= limit {
        DriverState::Done(StopReason::PageLimit { pages: page })
    } else {
        DriverState::Fetching { page: page + 1 }
    }
}

#[derive(Debug)]
pub struct SourceRun {
    /// Every record in discovery order, duplicates included
    pub records: Vec<ListingRecord>,
    pub pages_fetched: u32,
    pub stop: StopReason,
}

pub struct PaginationDriver<'a> {
    fetcher: &'a dyn PageFetcher,
    strategy: ExtractionStrategy,
    max_pages: u32,
    page_delay: DelayRange,
}

impl<'a> PaginationDriver<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        strategy: ExtractionStrategy,
        max_pages: u32,
        page_delay: DelayRange,
    ) -> Self {
        Self {
            fetcher,
            strategy,
            max_pages,
            page_delay,
        }
    }

    pub async fn run(&self, source: &SearchSource) -> SourceRun {
        let limit = source.page_limit(self.max_pages);
        let mut state = if limit == 0 {
            DriverState::Done(StopReason::PageLimit { pages: 0 })
        } else {
            DriverState::Fetching { page: 1 }
        };

        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut records = Vec::new();
        let mut pages_fetched = 0;

        loop {
            let page = match state {
                DriverState::Fetching { page } => page,
                DriverState::Done(stop) => {
                    tracing::info!(
                        "Finished {}: {} listings from {} pages ({})",
                        source.name,
                        records.len(),
                        pages_fetched,
                        stop
                    );
                    return SourceRun {
                        records,
                        pages_fetched,
                        stop,
                    };
                }
            };

            if page > 1 {
                self.page_delay.wait().await;
            }

            let url = source.page_url(page);
            tracing::info!("Scraping {} page {}: {}", source.name, page, url);

            state = match self.fetcher.fetch(&url).await {
                Ok(html) => {
                    pages_fetched += 1;
                    let page_records = self.extract_page(&html, source).await;
                    let found = page_records.len();
                    let new = page_records
                        .iter()
                        .filter(|record| seen_urls.insert(record.url.clone()))
                        .count();

                    if found == 0 && is_captcha_page(&html) {
                        tracing::warn!(
                            "Page {} of {} looks like an anti-bot challenge",
                            page,
                            source.name
                        );
                    }
                    tracing::info!("Found {} listings on page {} ({} new)", found, page, new);

                    records.extend(page_records);
                    next_state(page, found, new, limit)
                }
                Err(e) => {
                    tracing::error!("Failed to fetch page {} of {}: {}", page, source.name, e);
                    DriverState::Done(StopReason::FetchFailed { page })
                }
            };
        }
    }

    async fn extract_page(&self, html: &str, source: &SearchSource) -> Vec<ListingRecord> {
        match self.strategy {
            ExtractionStrategy::StructuredData => json_ld::extract_listings(html),
            ExtractionStrategy::Selectors => self.extract_from_cards(html, source).await,
            ExtractionStrategy::Auto => {
                if json_ld::has_structured_data(html) {
                    json_ld::extract_listings(html)
                } else {
                    tracing::debug!("No structured data on page, falling back to result cards");
                    self.extract_from_cards(html, source).await
                }
            }
        }
    }

    /// One detail-page fetch per result card; cards whose page cannot be
    /// fetched are skipped.
    async fn extract_from_cards(&self, html: &str, source: &SearchSource) -> Vec<ListingRecord> {
        let card_urls = detail_page::search_card_urls(html, &site_origin(&source.base_url));
        let mut records = Vec::with_capacity(card_urls.len());

        for url in card_urls {
            match self.fetcher.fetch(&url).await {
                Ok(detail_html) => {
                    records.push(detail_page::parse_detail(&detail_html).into_record(&url));
                }
                Err(e) => tracing::warn!("Skipping listing {}: {}", url, e),
            }
        }

        records
    }
}

/// "https://host" part of a URL, used to absolutize relative card links
pub fn site_origin(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => format!("{}://{}", parsed.scheme(), parsed.host_str().unwrap_or_default()),
        Err(_) => url.trim_end_matches('/').to_string(),
    }
}
