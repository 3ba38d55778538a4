mod config;
mod detail_page;
mod geocode;
mod http_client;
mod json_ld;
mod legacy;
mod models;
mod normalize;
mod pagination;
mod pipeline;
mod report;
mod scraper_trait;
mod scrapers;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, MapMode, DEFAULT_CONFIG_PATH};
use geocode::AddressResolver;
use http_client::HttpFetcher;
use models::ListingRecord;
use pipeline::Pipeline;
use report::summary::Summary;
use scraper_trait::ScraperRegistry;
use scrapers::KijijiScraper;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rentmap")]
#[command(about = "Scrape Kijiji rental listings and plot them on a map", long_about = None)]
struct Args {
    /// Path of the YAML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Write a default configuration file and exit
    #[arg(long)]
    init_config: bool,

    /// Override the global page limit per search source
    #[arg(long)]
    max_pages: Option<u32>,

    /// Skip geocoding; only coordinates found on the site are used
    #[arg(long)]
    no_geocode: bool,

    /// clustered, markers or list
    #[arg(long)]
    map_mode: Option<MapMode>,

    /// Read listings from a directory of legacy flat files instead of scraping
    #[arg(long)]
    from_legacy: Option<PathBuf>,

    /// Also write the listings as legacy flat files into this directory
    #[arg(long)]
    legacy_out: Option<PathBuf>,

    /// Test URL fetching - fetch and print HTML from a URL
    #[arg(long)]
    test_url: Option<String>,

    /// Save HTML to file when using --test-url
    #[arg(long)]
    save_html: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init_config {
        Config::create_default(&args.config)?;
        println!("Default configuration written to {}", args.config);
        return Ok(());
    }

    let mut config = Config::load(&args.config)?;

    if let Some(max_pages) = args.max_pages {
        config.max_pages = max_pages;
    }
    if args.no_geocode {
        config.geocoding.enabled = false;
    }
    if let Some(map_mode) = args.map_mode {
        config.output.map_mode = map_mode;
    }
    config.validate()?;

    // Initialize logging - use RUST_LOG env var if set, otherwise use config
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
        tracing::info!("Logging level set from RUST_LOG environment variable");
    } else {
        let level = config.tracing_level.to_lowercase();
        let max_level = match level.as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => {
                eprintln!("Invalid tracing level '{}', using 'info'", level);
                tracing::Level::INFO
            }
        };

        tracing_subscriber::fmt().with_max_level(max_level).init();

        tracing::info!("Logging level set to: {} (from {})", level, args.config);
    }

    if let Some(url) = args.test_url {
        return test_url_fetch(&url, args.save_html.as_deref(), &config).await;
    }

    let resolver = if config.geocoding.enabled {
        Some(AddressResolver::from_config(&config.geocoding)?)
    } else {
        None
    };
    let geocode_delay = Duration::from_millis(config.geocoding.delay_ms);

    let records = match &args.from_legacy {
        Some(dir) => {
            let records = legacy::read_legacy_dir(dir)
                .with_context(|| format!("Failed to read legacy files from {}", dir.display()))?;
            let mut records = normalize::normalize(records);
            if let Some(resolver) = &resolver {
                geocode::resolve_missing(&mut records, resolver, geocode_delay).await;
            }
            records
        }
        None => scrape(&config, resolver.as_ref(), geocode_delay).await?,
    };

    let written = report::write_outputs(&records, &config.output, &config.price_tiers)?;
    println!("Saved {} listings to {}", records.len(), written.csv.display());
    println!("{:?} view saved as {}", written.view, written.view_path.display());

    if let Some(dir) = &args.legacy_out {
        legacy::write_legacy_dir(dir, &records)
            .with_context(|| format!("Failed to write legacy files to {}", dir.display()))?;
        println!("Legacy flat files written to {}", dir.display());
    }

    if !records.is_empty() {
        println!();
        println!("{}", Summary::from_records(&records, &config.price_tiers));
    }

    Ok(())
}

async fn scrape(
    config: &Config,
    resolver: Option<&AddressResolver>,
    geocode_delay: Duration,
) -> Result<Vec<ListingRecord>> {
    tracing::info!("Starting rental scraping batch...");

    let fetcher = Arc::new(HttpFetcher::from_config(config)?);

    let mut registry = ScraperRegistry::new();
    registry.register(Box::new(KijijiScraper::with_config(fetcher.clone(), config)));
    tracing::info!("Registered scrapers: {:?}", registry.list_scrapers());

    let mut pipeline = Pipeline::new(&registry, config.max_pages);
    if config.fetch_details {
        pipeline = pipeline.with_detail_pages(fetcher.as_ref(), config.request_delay);
    }
    if let Some(resolver) = resolver {
        pipeline = pipeline.with_geocoding(resolver, geocode_delay);
    }

    let outcome = pipeline.run().await?;
    tracing::info!(
        "Batch finished: {} listings discovered, {} unique, {} located from detail pages",
        outcome.discovered,
        outcome.records.len(),
        outcome.enriched
    );
    if let Some(stats) = outcome.geocoding {
        tracing::info!("Geocoding resolved {} of {} addresses", stats.resolved, stats.attempted);
    }

    Ok(outcome.records)
}

/// Test URL fetching - downloads and prints HTML response
async fn test_url_fetch(url: &str, save_path: Option<&str>, config: &Config) -> Result<()> {
    println!("Testing URL fetch: {}", url);
    println!("{}", "=".repeat(80));
    println!("User-Agent: {}", config.user_agent);

    let timeout = Duration::from_secs(config.request_timeout_secs);
    let client = if std::path::Path::new(&config.cookies_file).exists() {
        println!("Loading cookies from {}...", config.cookies_file);
        let cookie_jar = Arc::new(reqwest::cookie::Jar::default());
        let loaded = http_client::load_cookies_from_file(&cookie_jar, &config.cookies_file, url)?;
        println!("Loaded {} cookies", loaded);
        http_client::create_http_client_with_cookies(&config.user_agent, timeout, Some(cookie_jar))?
    } else {
        println!("No {} found - continuing without cookies", config.cookies_file);
        http_client::create_http_client(&config.user_agent, timeout)?
    };

    println!("Sending request...");
    let response = client.get(url).send().await?;

    println!("Status: {}", response.status());
    println!("\nResponse Headers:");
    for (name, value) in response.headers() {
        println!("  {}: {:?}", name, value);
    }

    println!("{}", "=".repeat(80));

    let body = response.text().await?;

    if let Some(path) = save_path {
        std::fs::write(path, &body)?;
        println!("HTML saved to: {}", path);
    } else {
        println!("Response body:");
        println!("{}", "=".repeat(80));
        println!("{}", body);
    }
    println!("{}", "=".repeat(80));

    println!("Total length: {} bytes", body.len());

    let structured = json_ld::extract_listings(&body);
    if structured.is_empty() {
        let cards = detail_page::search_card_urls(&body, &pagination::site_origin(url));
        println!("No structured listings; {} result cards found", cards.len());
    } else {
        println!("Structured data lists {} listings", structured.len());
        for (i, listing) in structured.iter().enumerate() {
            println!("  #{} {} | {} | {}", i + 1, listing.title, listing.price, listing.address);
        }
    }

    if http_client::is_captcha_page(&body) {
        println!("\n⚠️  WARNING: Response may contain CAPTCHA or anti-bot protection!");
        println!("Consider:");
        println!("  - Increasing request_delay in config");
        println!("  - Changing user_agent in config");
        println!("  - Exporting browser cookies to {}", config.cookies_file);
    }

    Ok(())
}
