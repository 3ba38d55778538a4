use crate::config::{Config, DelayRange};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{cookie::Jar, header, Client, StatusCode};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Creates an HTTP client with browser-like headers so result pages are served
/// the same markup a visitor gets.
pub fn create_http_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    create_http_client_with_cookies(user_agent, timeout, None)
}

/// Creates an HTTP client with optional cookie jar for cookie persistence
pub fn create_http_client_with_cookies(
    user_agent: &str,
    timeout: Duration,
    cookie_jar: Option<Arc<Jar>>,
) -> Result<Client> {
    let mut headers = header::HeaderMap::new();

    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8")
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static("en-CA,en-US;q=0.9,en;q=0.8")
    );
    headers.insert(
        header::CONNECTION,
        header::HeaderValue::from_static("keep-alive")
    );
    headers.insert(
        "Upgrade-Insecure-Requests",
        header::HeaderValue::from_static("1")
    );
    headers.insert(
        "Sec-Fetch-Dest",
        header::HeaderValue::from_static("document")
    );
    headers.insert(
        "Sec-Fetch-Mode",
        header::HeaderValue::from_static("navigate")
    );
    headers.insert(
        "Sec-Fetch-Site",
        header::HeaderValue::from_static("none")
    );
    headers.insert(
        "Sec-Fetch-User",
        header::HeaderValue::from_static("?1")
    );
    headers.insert(
        "Cache-Control",
        header::HeaderValue::from_static("max-age=0")
    );

    let mut builder = Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(timeout);

    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(jar);
    } else {
        builder = builder.cookie_store(true);
    }

    Ok(builder.build()?)
}

/// Load cookies exported from a browser (array of objects with "name" and
/// "value", as written by extensions like "Cookie Editor") into `jar` for
/// `site_url`. Returns how many were loaded.
pub fn load_cookies_from_file(jar: &Jar, path: &str, site_url: &str) -> Result<usize> {
    let cookie_data = std::fs::read_to_string(path)?;
    let cookies: Vec<serde_json::Value> = serde_json::from_str(&cookie_data)?;

    let parsed_url = site_url.parse::<reqwest::Url>()?;
    let base_url = format!("{}://{}", parsed_url.scheme(), parsed_url.host_str().unwrap_or(""));
    let cookie_url = base_url.parse::<reqwest::Url>()?;

    let mut loaded_count = 0;
    for cookie in &cookies {
        if let (Some(name), Some(value)) = (
            cookie.get("name").and_then(|v| v.as_str()),
            cookie.get("value").and_then(|v| v.as_str()),
        ) {
            jar.add_cookie_str(&format!("{}={}", name, value), &cookie_url);
            tracing::debug!("Loaded cookie: {}", name);
            loaded_count += 1;
        }
    }

    tracing::info!("Loaded {} cookies from {}", loaded_count, path);
    Ok(loaded_count)
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("access denied ({status}) for {url}")]
    Permanent { url: String, status: u16 },

    #[error("gave up on {url} after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

/// Why a single attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Network error, timeout or unexpected status; worth another try
    Transient(String),
    /// 429; retry after the long backoff
    RateLimited,
    /// The server refuses this URL; do not retry
    Permanent(u16),
}

impl AttemptError {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            429 => AttemptError::RateLimited,
            code @ (401 | 403 | 404 | 410) => AttemptError::Permanent(code),
            code => AttemptError::Transient(format!("HTTP {}", code)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause before each attempt
    pub request_delay: DelayRange,
    /// Multiplied by the attempt number after a transient failure
    pub retry_backoff: DelayRange,
    pub rate_limit_backoff: DelayRange,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            request_delay: config.request_delay,
            retry_backoff: config.retry_backoff,
            rate_limit_backoff: config.rate_limit_backoff,
        }
    }

    /// Policy without any pauses
    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            request_delay: DelayRange::none(),
            retry_backoff: DelayRange::none(),
            rate_limit_backoff: DelayRange::none(),
        }
    }

    /// Backoff grows with the attempt number
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff.sample() * attempt.max(1)
    }
}

/// Run `attempt` until it succeeds, fails permanently, or the policy's
/// attempts are used up.
pub async fn with_retries<F, Fut>(
    url: &str,
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<String, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, AttemptError>>,
{
    let mut last_error = String::from("no attempt made");

    for attempt_no in 1..=policy.max_attempts {
        policy.request_delay.wait().await;

        match attempt().await {
            Ok(body) => return Ok(body),
            Err(AttemptError::Permanent(status)) => {
                tracing::error!("Access denied ({}) for {}", status, url);
                return Err(FetchError::Permanent {
                    url: url.to_string(),
                    status,
                });
            }
            Err(AttemptError::RateLimited) => {
                tracing::warn!("Rate limited (429) for {}, waiting longer...", url);
                last_error = "rate limited (429)".to_string();
                if attempt_no < policy.max_attempts {
                    policy.rate_limit_backoff.wait().await;
                }
            }
            Err(AttemptError::Transient(reason)) => {
                tracing::warn!(
                    "Request error for {} (attempt {}/{}): {}",
                    url,
                    attempt_no,
                    policy.max_attempts,
                    reason
                );
                last_error = reason;
                if attempt_no < policy.max_attempts {
                    let delay = policy.backoff(attempt_no);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    Err(FetchError::Exhausted {
        url: url.to_string(),
        attempts: policy.max_attempts,
        last_error,
    })
}

/// Source of page bodies for the pagination driver
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Live fetcher: one reqwest client reused for the whole batch
pub struct HttpFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Client built from the configuration, with cookies from
    /// `config.cookies_file` when that file exists
    pub fn from_config(config: &Config) -> Result<Self> {
        let jar = Arc::new(Jar::default());

        if std::path::Path::new(&config.cookies_file).exists() {
            let site = config
                .sources
                .first()
                .map(|s| s.base_url.as_str())
                .unwrap_or("https://www.kijiji.ca");
            if let Err(e) = load_cookies_from_file(&jar, &config.cookies_file, site) {
                tracing::warn!("Failed to load cookies from {}: {}", config.cookies_file, e);
            }
        } else {
            tracing::debug!(
                "No cookies file at {}, continuing without cookies",
                config.cookies_file
            );
        }

        let client = create_http_client_with_cookies(
            &config.user_agent,
            Duration::from_secs(config.request_timeout_secs),
            Some(jar),
        )?;
        Ok(Self::new(client, RetryPolicy::from_config(config)))
    }

    async fn attempt(&self, url: &str) -> Result<String, AttemptError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::from_status(status));
        }

        response
            .text()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!("Fetching {}", url);
        let body = with_retries(url, &self.policy, || self.attempt(url)).await?;
        tracing::debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

/// Heuristic for anti-bot interstitials served with a 200 status
pub fn is_captcha_page(html: &str) -> bool {
    let html_lower = html.to_lowercase();

    html_lower.contains("captcha")
        || html_lower.contains("cf-browser-verification")
        || html_lower.contains("cf_chl_opt")
        || html_lower.contains("bot detection")
}
