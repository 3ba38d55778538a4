use crate::normalize::PriceTiers;
use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "data/config.yaml";

/// Inclusive range of milliseconds a polite pause is drawn from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn sample(&self) -> Duration {
        let ms = if self.max_ms > self.min_ms {
            rand::thread_rng().gen_range(self.min_ms..=self.max_ms)
        } else {
            self.min_ms
        };
        Duration::from_millis(ms)
    }

    pub async fn wait(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// JSON-LD only
    StructuredData,
    /// Result cards plus one detail-page fetch per card
    Selectors,
    /// JSON-LD, falling back to selectors on pages without an item list
    #[default]
    Auto,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MapMode {
    /// One marker per listing, grouped into clusters at low zoom
    #[default]
    Clustered,
    /// One marker per listing, no clustering
    Markers,
    /// Plain HTML list, no map
    List,
}

impl FromStr for MapMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "clustered" | "cluster" => Ok(MapMode::Clustered),
            "markers" | "flat" => Ok(MapMode::Markers),
            "list" => Ok(MapMode::List),
            other => {
                anyhow::bail!("unknown map mode '{}' (expected clustered, markers or list)", other)
            }
        }
    }
}

impl fmt::Display for MapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MapMode::Clustered => "clustered",
            MapMode::Markers => "markers",
            MapMode::List => "list",
        };
        write!(f, "{}", name)
    }
}

/// One search to paginate through
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SearchSource {
    pub name: String,
    /// e.g. "https://www.kijiji.ca/b-apartments-condos/st-johns"
    pub base_url: String,
    /// Location/category code appended after the page segment, e.g. "c37l1700113"
    pub suffix: String,
    /// Extra query string without the leading '?', e.g. "sort=dateDesc"
    #[serde(default)]
    pub query: Option<String>,
    /// Per-source ceiling, applied on top of the global `max_pages`
    #[serde(default)]
    pub max_pages: Option<u32>,
}

impl SearchSource {
    pub fn page_url(&self, page: u32) -> String {
        let base = self.base_url.trim_end_matches('/');
        let suffix = self.suffix.trim_matches('/');
        let mut url = if page <= 1 {
            format!("{}/{}", base, suffix)
        } else {
            format!("{}/page-{}/{}", base, page, suffix)
        };
        if let Some(query) = self.query.as_deref().filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query.trim_start_matches('?'));
        }
        url
    }

    pub fn page_limit(&self, global_max: u32) -> u32 {
        self.max_pages.map_or(global_max, |own| own.min(global_max))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeocodingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Coarse query used by the fallback provider when an address has no
    /// city part of its own
    #[serde(default = "default_fallback_region")]
    pub fallback_region: String,
    #[serde(default = "default_geocode_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_geocode_attempts")]
    pub attempts: u32,
    /// Fixed pause between two resolver calls
    #[serde(default = "default_geocode_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_arcgis_url")]
    pub arcgis_url: String,
    #[serde(default = "default_nominatim_url")]
    pub nominatim_url: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_region: default_fallback_region(),
            timeout_secs: default_geocode_timeout_secs(),
            attempts: default_geocode_attempts(),
            delay_ms: default_geocode_delay_ms(),
            arcgis_url: default_arcgis_url(),
            nominatim_url: default_nominatim_url(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_csv_path")]
    pub csv_path: String,
    #[serde(default = "default_map_path")]
    pub map_path: String,
    #[serde(default = "default_list_path")]
    pub list_path: String,
    #[serde(default)]
    pub map_mode: MapMode,
    #[serde(default = "default_map_center")]
    pub map_center: [f64; 2],
    #[serde(default = "default_map_zoom")]
    pub map_zoom: u8,
    #[serde(default = "default_map_title")]
    pub title: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
            map_path: default_map_path(),
            list_path: default_list_path(),
            map_mode: MapMode::default(),
            map_center: default_map_center(),
            map_zoom: default_map_zoom(),
            title: default_map_title(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_sources")]
    pub sources: Vec<SearchSource>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default)]
    pub strategy: ExtractionStrategy,
    /// Fetch detail pages for listings that still lack coordinates
    #[serde(default)]
    pub fetch_details: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause before every request
    #[serde(default = "default_request_delay")]
    pub request_delay: DelayRange,
    /// Base pause after a failed request, multiplied by the attempt number
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: DelayRange,
    /// Pause after a 429 response
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff: DelayRange,
    /// Pause between two result pages of the same source
    #[serde(default = "default_page_delay")]
    pub page_delay: DelayRange,
    #[serde(default = "default_cookies_file")]
    pub cookies_file: String,
    #[serde(default)]
    pub price_tiers: PriceTiers,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_true() -> bool {
    true
}

fn default_sources() -> Vec<SearchSource> {
    vec![
        SearchSource {
            name: "apartments-condos".to_string(),
            base_url: "https://www.kijiji.ca/b-apartments-condos/st-johns".to_string(),
            suffix: "c37l1700113".to_string(),
            query: None,
            max_pages: Some(5),
        },
        SearchSource {
            name: "for-rent".to_string(),
            base_url: "https://www.kijiji.ca/b-for-rent/st-johns".to_string(),
            suffix: "c30349001l1700113".to_string(),
            query: None,
            max_pages: Some(8),
        },
    ]
}

fn default_max_pages() -> u32 {
    10
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_delay() -> DelayRange {
    DelayRange::new(2000, 5000)
}

fn default_retry_backoff() -> DelayRange {
    DelayRange::new(5000, 10000)
}

fn default_rate_limit_backoff() -> DelayRange {
    DelayRange::new(10000, 20000)
}

fn default_page_delay() -> DelayRange {
    DelayRange::new(3000, 6000)
}

fn default_cookies_file() -> String {
    "data/cookies.json".to_string()
}

fn default_fallback_region() -> String {
    "St. John's, NL".to_string()
}

fn default_geocode_timeout_secs() -> u64 {
    10
}

fn default_geocode_attempts() -> u32 {
    2
}

fn default_geocode_delay_ms() -> u64 {
    300
}

fn default_arcgis_url() -> String {
    "https://geocode.arcgis.com/arcgis/rest/services/World/GeocodeServer/findAddressCandidates".to_string()
}

fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}

fn default_csv_path() -> String {
    "kijiji_rentals.csv".to_string()
}

fn default_map_path() -> String {
    "kijiji_rental_map.html".to_string()
}

fn default_list_path() -> String {
    "kijiji_rental_list.html".to_string()
}

fn default_map_center() -> [f64; 2] {
    [47.5669, -52.7067] // St. John's, NL
}

fn default_map_zoom() -> u8 {
    13
}

fn default_map_title() -> String {
    "Kijiji Rentals - St. John's".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sources: default_sources(),
            max_pages: default_max_pages(),
            strategy: ExtractionStrategy::default(),
            fetch_details: false,
            tracing_level: default_tracing_level(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            request_delay: default_request_delay(),
            retry_backoff: default_retry_backoff(),
            rate_limit_backoff: default_rate_limit_backoff(),
            page_delay: default_page_delay(),
            cookies_file: default_cookies_file(),
            price_tiers: PriceTiers::default(),
            geocoding: GeocodingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Load `path` when it exists (defaults otherwise), then apply
    /// environment overrides and validate.
    pub fn load(path: &str) -> Result<Self> {
        let mut config: Config = if Path::new(path).exists() {
            let config_str = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path))?;
            serde_yaml::from_str(&config_str)
                .with_context(|| format!("Failed to parse config file {}", path))?
        } else {
            Config::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(max_pages) = env::var("MAX_PAGES") {
            self.max_pages = max_pages.parse()
                .context("Failed to parse MAX_PAGES environment variable")?;
        }

        if let Ok(enabled) = env::var("ENABLE_GEOCODING") {
            self.geocoding.enabled = enabled.parse()
                .context("Failed to parse ENABLE_GEOCODING environment variable")?;
        }

        if let Ok(tracing_level) = env::var("TRACING_LEVEL") {
            self.tracing_level = tracing_level;
        }

        if let Ok(user_agent) = env::var("USER_AGENT") {
            self.user_agent = user_agent;
        }

        if let Ok(map_mode) = env::var("MAP_MODE") {
            self.output.map_mode = map_mode.parse()
                .context("Failed to parse MAP_MODE environment variable")?;
        }

        if let Ok(request_delay) = env::var("REQUEST_DELAY_MS") {
            let ms: u64 = request_delay.parse()
                .context("Failed to parse REQUEST_DELAY_MS environment variable")?;
            self.request_delay = DelayRange::new(ms, ms);
        }

        Ok(())
    }

    /// Reject configurations the run cannot recover from
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            anyhow::bail!("At least one search source is required");
        }

        for source in &self.sources {
            if source.base_url.trim().is_empty() || source.suffix.trim().is_empty() {
                anyhow::bail!("Source '{}' needs both base_url and suffix", source.name);
            }
        }

        if self.max_pages == 0 {
            anyhow::bail!("max_pages must be at least 1");
        }

        if self.max_retries == 0 {
            anyhow::bail!("max_retries must be at least 1");
        }

        for (name, range) in [
            ("request_delay", self.request_delay),
            ("retry_backoff", self.retry_backoff),
            ("rate_limit_backoff", self.rate_limit_backoff),
            ("page_delay", self.page_delay),
        ] {
            if range.min_ms > range.max_ms {
                anyhow::bail!(
                    "{}: min_ms ({}) is greater than max_ms ({})",
                    name,
                    range.min_ms,
                    range.max_ms
                );
            }
        }

        if !(self.price_tiers.low < self.price_tiers.high) {
            anyhow::bail!(
                "price_tiers.low ({}) must be below price_tiers.high ({})",
                self.price_tiers.low,
                self.price_tiers.high
            );
        }

        if self.geocoding.attempts == 0 {
            anyhow::bail!("geocoding.attempts must be at least 1");
        }

        Ok(())
    }

    pub fn create_default(path: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let config_str = serde_yaml::to_string(&Config::default())?;
        fs::write(path, config_str)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_template() {
        let source = &default_sources()[0];
        assert_eq!(
            source.page_url(1),
            "https://www.kijiji.ca/b-apartments-condos/st-johns/c37l1700113"
        );
        assert_eq!(
            source.page_url(3),
            "https://www.kijiji.ca/b-apartments-condos/st-johns/page-3/c37l1700113"
        );
    }

    #[test]
    fn test_page_url_with_query() {
        let source = SearchSource {
            name: "sorted".to_string(),
            base_url: "https://www.kijiji.ca/b-for-rent/st-johns/".to_string(),
            suffix: "/c30349001l1700113".to_string(),
            query: Some("ad=offering&sort=dateDesc".to_string()),
            max_pages: None,
        };
        assert_eq!(
            source.page_url(2),
            "https://www.kijiji.ca/b-for-rent/st-johns/page-2/c30349001l1700113?ad=offering&sort=dateDesc"
        );
    }

    #[test]
    fn test_page_limit() {
        let mut source = default_sources()[0].clone();
        assert_eq!(source.page_limit(10), 5);
        assert_eq!(source.page_limit(3), 3);
        source.max_pages = None;
        assert_eq!(source.page_limit(7), 7);
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.price_tiers, PriceTiers { low: 800.0, high: 1200.0 });
        assert_eq!(config.output.map_mode, MapMode::Clustered);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
max_pages: 2
strategy: structured_data
price_tiers:
  low: 600
  high: 1000
output:
  map_mode: list
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_pages, 2);
        assert_eq!(config.strategy, ExtractionStrategy::StructuredData);
        assert_eq!(config.price_tiers, PriceTiers { low: 600.0, high: 1000.0 });
        assert_eq!(config.output.map_mode, MapMode::List);
        assert_eq!(config.output.csv_path, "kijiji_rentals.csv");
        assert_eq!(config.sources.len(), 2);
        assert!(config.geocoding.enabled);
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let mut config = Config::default();
        config.max_pages = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.price_tiers = PriceTiers { low: 1200.0, high: 800.0 };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sources.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.page_delay = DelayRange::new(10, 5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_map_mode_from_str() {
        assert_eq!("Clustered".parse::<MapMode>().unwrap(), MapMode::Clustered);
        assert_eq!("list".parse::<MapMode>().unwrap(), MapMode::List);
        assert!("satellite".parse::<MapMode>().is_err());
    }

    #[test]
    fn test_delay_range_sample_bounds() {
        let range = DelayRange::new(5, 9);
        for _ in 0..50 {
            let ms = range.sample().as_millis() as u64;
            assert!((5..=9).contains(&ms));
        }
        assert!(DelayRange::none().sample().is_zero());
    }
}
