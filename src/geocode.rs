use crate::config::GeocodingConfig;
use crate::json_ld::clean_text;
use crate::models::{Coordinates, ListingRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// A free-text address lookup service
#[async_trait]
pub trait Geocoder: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means the service answered but found nothing
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>>;
}

#[derive(Debug, Deserialize)]
struct ArcGisResponse {
    #[serde(default)]
    candidates: Vec<ArcGisCandidate>,
}

#[derive(Debug, Deserialize)]
struct ArcGisCandidate {
    location: ArcGisLocation,
}

#[derive(Debug, Deserialize)]
struct ArcGisLocation {
    x: f64,
    y: f64,
}

/// ArcGIS World Geocoding Service, `findAddressCandidates` endpoint
pub struct ArcGisGeocoder {
    client: Client,
    endpoint: String,
}

impl ArcGisGeocoder {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    fn request_url(&self, query: &str) -> String {
        format!(
            "{}?SingleLine={}&f=json&maxLocations=1&outFields=Match_addr",
            self.endpoint,
            urlencoding::encode(query)
        )
    }
}

#[async_trait]
impl Geocoder for ArcGisGeocoder {
    fn name(&self) -> &str {
        "ArcGIS"
    }

    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>> {
        let response = self
            .client
            .get(self.request_url(query))
            .send()
            .await?
            .error_for_status()?;
        let body: ArcGisResponse = response.json().await.context("Unexpected ArcGIS response")?;

        Ok(body
            .candidates
            .first()
            .map(|c| Coordinates::new(c.location.y, c.location.x)))
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// OpenStreetMap Nominatim search
pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
}

impl NominatimGeocoder {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    fn request_url(&self, query: &str) -> String {
        format!("{}?q={}&format=json&limit=1", self.endpoint, urlencoding::encode(query))
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    fn name(&self) -> &str {
        "Nominatim"
    }

    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>> {
        let response = self
            .client
            .get(self.request_url(query))
            .send()
            .await?
            .error_for_status()?;
        let places: Vec<NominatimPlace> =
            response.json().await.context("Unexpected Nominatim response")?;

        let Some(place) = places.first() else {
            return Ok(None);
        };
        let latitude = place.lat.parse::<f64>().context("Invalid latitude from Nominatim")?;
        let longitude = place.lon.parse::<f64>().context("Invalid longitude from Nominatim")?;
        Ok(Some(Coordinates::new(latitude, longitude)))
    }
}

/// Client for geocoding APIs. Nominatim's usage policy asks for an
/// identifying user agent rather than a browser one.
pub fn create_geocoding_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Address → coordinates with a primary service and a coarser fallback query
/// against a secondary service. Failures end as `None`, never as errors.
pub struct AddressResolver {
    primary: Box<dyn Geocoder>,
    fallback: Box<dyn Geocoder>,
    fallback_region: String,
    timeout: Duration,
    attempts: u32,
    retry_backoff: Duration,
}

impl AddressResolver {
    pub fn new(
        primary: Box<dyn Geocoder>,
        fallback: Box<dyn Geocoder>,
        fallback_region: impl Into<String>,
    ) -> Self {
        Self {
            primary,
            fallback,
            fallback_region: fallback_region.into(),
            timeout: Duration::from_secs(10),
            attempts: 2,
            retry_backoff: Duration::from_secs(1),
        }
    }

    pub fn with_limits(
        mut self,
        timeout: Duration,
        attempts: u32,
        retry_backoff: Duration,
    ) -> Self {
        self.timeout = timeout;
        self.attempts = attempts.max(1);
        self.retry_backoff = retry_backoff;
        self
    }

    /// ArcGIS first, Nominatim for the fallback query
    pub fn from_config(config: &GeocodingConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = create_geocoding_client(timeout)?;

        Ok(Self::new(
            Box::new(ArcGisGeocoder::new(client.clone(), config.arcgis_url.clone())),
            Box::new(NominatimGeocoder::new(client, config.nominatim_url.clone())),
            config.fallback_region.clone(),
        )
        .with_limits(timeout, config.attempts, Duration::from_secs(1)))
    }

    pub async fn resolve(&self, address: &str) -> Option<Coordinates> {
        let query = clean_text(address);
        if query.is_empty() || query == crate::models::NO_ADDRESS {
            return None;
        }

        if let Some(coordinates) = self.lookup(self.primary.as_ref(), &query).await {
            tracing::debug!("Geocoded '{}' via {}", query, self.primary.name());
            return Some(coordinates);
        }

        let coarse = coarse_query(&query, &self.fallback_region);
        tracing::info!(
            "Could not geocode '{}' with {}, trying {} with '{}'",
            query,
            self.primary.name(),
            self.fallback.name(),
            coarse
        );
        self.lookup(self.fallback.as_ref(), &coarse).await
    }

    async fn lookup(&self, geocoder: &dyn Geocoder, query: &str) -> Option<Coordinates> {
        for attempt in 1..=self.attempts {
            match tokio::time::timeout(self.timeout, geocoder.geocode(query)).await {
                Ok(Ok(Some(coordinates))) if coordinates.is_valid() => return Some(coordinates),
                Ok(Ok(Some(coordinates))) => {
                    tracing::warn!(
                        "{} returned out-of-range coordinates {:?} for '{}'",
                        geocoder.name(),
                        coordinates,
                        query
                    );
                    return None;
                }
                Ok(Ok(None)) => {
                    tracing::debug!("{} found nothing for '{}'", geocoder.name(), query);
                    return None;
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        "{} failed for '{}' (attempt {}/{}): {}",
                        geocoder.name(),
                        query,
                        attempt,
                        self.attempts,
                        e
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        "{} timed out for '{}' (attempt {}/{})",
                        geocoder.name(),
                        query,
                        attempt,
                        self.attempts
                    );
                }
            }

            if attempt < self.attempts && !self.retry_backoff.is_zero() {
                tokio::time::sleep(self.retry_backoff * attempt).await;
            }
        }
        None
    }
}

/// City-level version of an address: drop the street part (first comma
/// component), or use `region` when nothing else is left.
pub fn coarse_query(address: &str, region: &str) -> String {
    let parts: Vec<&str> = address
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if parts.len() >= 2 {
        parts[1..].join(", ")
    } else {
        region.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub attempted: usize,
    pub resolved: usize,
}

/// Look up coordinates for every record that has none, one call per record,
/// pausing `delay` between calls. Records with coordinates are left untouched.
pub async fn resolve_missing(
    records: &mut [ListingRecord],
    resolver: &AddressResolver,
    delay: Duration,
) -> ResolveStats {
    let mut stats = ResolveStats::default();

    for record in records.iter_mut().filter(|r| !r.has_coordinates() && r.has_address()) {
        if stats.attempted > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        stats.attempted += 1;

        if let Some(coordinates) = resolver.resolve(&record.address).await {
            tracing::info!(
                "Geocoded: {} -> ({:.4}, {:.4})",
                record.address,
                coordinates.latitude,
                coordinates.longitude
            );
            record.coordinates = Some(coordinates);
            stats.resolved += 1;
        }
    }

    tracing::info!("Geocoded {} of {} addresses", stats.resolved, stats.attempted);
    stats
}
