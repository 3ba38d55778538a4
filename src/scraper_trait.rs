use crate::models::ListingRecord;
use anyhow::Result;
use async_trait::async_trait;

/// Trait that all listing sites must implement
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Returns the name of the scraper/website
    fn name(&self) -> &str;

    /// Walks the site's result pages, at most `max_pages` per search, and
    /// returns every listing found in discovery order
    async fn scrape(&self, max_pages: u32) -> Result<Vec<ListingRecord>>;

    fn is_enabled(&self) -> bool {
        true
    }
}

pub struct ScraperRegistry {
    scrapers: Vec<Box<dyn Scraper>>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self {
            scrapers: Vec::new(),
        }
    }

    pub fn register(&mut self, scraper: Box<dyn Scraper>) {
        self.scrapers.push(scraper);
    }

    /// Runs every enabled scraper in registration order. A failing scraper
    /// is logged and skipped so the others still contribute.
    pub async fn scrape_all(&self, max_pages: u32) -> Result<Vec<ListingRecord>> {
        let mut all_listings = Vec::new();

        for scraper in &self.scrapers {
            if !scraper.is_enabled() {
                tracing::debug!("Skipping disabled scraper {}", scraper.name());
                continue;
            }

            tracing::info!("Scraping from {}", scraper.name());

            match scraper.scrape(max_pages).await {
                Ok(mut listings) => {
                    tracing::info!("Found {} listings from {}", listings.len(), scraper.name());
                    all_listings.append(&mut listings);
                }
                Err(e) => {
                    tracing::error!("Failed to scrape from {}: {}", scraper.name(), e);
                }
            }
        }

        Ok(all_listings)
    }

    pub fn list_scrapers(&self) -> Vec<String> {
        self.scrapers.iter().map(|s| s.name().to_string()).collect()
    }
}

impl Default for ScraperRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedScraper {
        name: &'static str,
        urls: Vec<&'static str>,
        enabled: bool,
    }

    #[async_trait]
    impl Scraper for FixedScraper {
        fn name(&self) -> &str {
            self.name
        }

        async fn scrape(&self, _max_pages: u32) -> Result<Vec<ListingRecord>> {
            Ok(self.urls.iter().map(|u| ListingRecord::new(*u)).collect())
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }
    }

    struct BrokenScraper;

    #[async_trait]
    impl Scraper for BrokenScraper {
        fn name(&self) -> &str {
            "broken"
        }

        async fn scrape(&self, _max_pages: u32) -> Result<Vec<ListingRecord>> {
            anyhow::bail!("site unreachable")
        }
    }

    #[tokio::test]
    async fn test_scrape_all_keeps_registration_order() {
        let mut registry = ScraperRegistry::new();
        registry.register(Box::new(FixedScraper {
            name: "first",
            urls: vec!["a", "b"],
            enabled: true,
        }));
        registry.register(Box::new(BrokenScraper));
        registry.register(Box::new(FixedScraper {
            name: "off",
            urls: vec!["x"],
            enabled: false,
        }));
        registry.register(Box::new(FixedScraper {
            name: "second",
            urls: vec!["c"],
            enabled: true,
        }));

        let listings = registry.scrape_all(3).await.unwrap();
        let urls: Vec<&str> = listings.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b", "c"]);
        assert_eq!(registry.list_scrapers(), vec!["first", "broken", "off", "second"]);
    }
}
