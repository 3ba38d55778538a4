//! Selector-based extraction for pages without usable structured data.
//!
//! Every field has a fixed priority list of selectors. Candidates are tried in
//! order and the first one producing a non-empty value wins; a field nobody
//! matches stays `None`.

use crate::json_ld::clean_text;
use crate::models::{Coordinates, ListingRecord, Price};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

/// Where a candidate reads its value from
#[derive(Debug, Clone, Copy)]
enum Source {
    Text,
    Attr(&'static str),
}

const TITLE_CANDIDATES: &[(&str, Source)] = &[
    ("h1[class*='title']", Source::Text),
    ("[data-testid='listing-title']", Source::Text),
    ("h1", Source::Text),
    ("meta[property='og:title']", Source::Attr("content")),
];

const PRICE_CANDIDATES: &[(&str, Source)] = &[
    ("span[class*='currentPrice']", Source::Text),
    ("[class*='currentPrice'] span", Source::Text),
    ("[data-testid='listing-price']", Source::Text),
    ("[itemprop='price']", Source::Attr("content")),
    ("[itemprop='price']", Source::Text),
];

const ADDRESS_CANDIDATES: &[(&str, Source)] = &[
    ("span[class*='address']", Source::Text),
    ("[data-testid='listing-address']", Source::Text),
    ("[itemprop='address']", Source::Text),
    ("meta[property='og:street-address']", Source::Attr("content")),
];

const DESCRIPTION_CANDIDATES: &[(&str, Source)] = &[
    ("[data-testid*='description']", Source::Text),
    (".description", Source::Text),
    ("[class*='description']", Source::Text),
    ("meta[property='og:description']", Source::Attr("content")),
];

const LATITUDE_CANDIDATES: &[(&str, Source)] = &[
    ("meta[property='og:latitude']", Source::Attr("content")),
    ("meta[property='place:location:latitude']", Source::Attr("content")),
    ("[itemprop='latitude']", Source::Attr("content")),
];

const LONGITUDE_CANDIDATES: &[(&str, Source)] = &[
    ("meta[property='og:longitude']", Source::Attr("content")),
    ("meta[property='place:location:longitude']", Source::Attr("content")),
    ("[itemprop='longitude']", Source::Attr("content")),
];

/// Result-card markup of the legacy search pages, each pointing at a detail page
const CARD_CANDIDATES: &[(&str, Source)] = &[
    ("div.search-item[data-vip-url]", Source::Attr("data-vip-url")),
    ("[data-listing-id] a[href]", Source::Attr("href")),
    ("a[data-testid='listing-link']", Source::Attr("href")),
];

/// Whatever a detail page revealed about one listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailPage {
    pub title: Option<String>,
    pub price: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub attributes: BTreeMap<String, String>,
}

impl DetailPage {
    /// Build a record for `url`, substituting sentinels for missing fields
    pub fn into_record(self, url: &str) -> ListingRecord {
        let mut record = ListingRecord::new(url);
        if let Some(title) = self.title {
            record.title = title;
        }
        if let Some(price) = self.price {
            record.price = Price::Listed(price);
        }
        if let Some(address) = self.address {
            record.address = address;
        }
        if let Some(description) = self.description {
            record.description = description;
        }
        record.coordinates = self.coordinates;
        record.attributes = self.attributes;
        record
    }
}

impl ListingRecord {
    /// Fill gaps from a detail page: coordinates only when missing,
    /// description whenever the page has one.
    pub fn enrich_from(&mut self, details: &DetailPage) {
        if self.coordinates.is_none() {
            self.coordinates = details.coordinates;
        }
        if let Some(description) = &details.description {
            self.description = description.clone();
        }
        for (name, value) in &details.attributes {
            self.attributes.entry(name.clone()).or_insert_with(|| value.clone());
        }
    }
}

pub fn parse_detail(html: &str) -> DetailPage {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let coordinates = match (
        first_match(&root, LATITUDE_CANDIDATES).and_then(|s| s.parse::<f64>().ok()),
        first_match(&root, LONGITUDE_CANDIDATES).and_then(|s| s.parse::<f64>().ok()),
    ) {
        (Some(latitude), Some(longitude)) => {
            Some(Coordinates::new(latitude, longitude)).filter(Coordinates::is_valid)
        }
        _ => None,
    };

    DetailPage {
        title: first_match(&root, TITLE_CANDIDATES),
        price: first_match(&root, PRICE_CANDIDATES),
        address: first_match(&root, ADDRESS_CANDIDATES),
        description: first_match(&root, DESCRIPTION_CANDIDATES),
        coordinates,
        attributes: extract_attributes(&root),
    }
}

/// Detail page URLs linked from a legacy search page, made absolute against
/// `base` and de-duplicated in page order.
pub fn search_card_urls(html: &str, base: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    for (selector_str, source) in CARD_CANDIDATES {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };

        let mut urls: Vec<String> = Vec::new();
        for element in root.select(&selector) {
            if let Some(href) = read(&element, *source) {
                let url = absolute_url(&href, base);
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }

        if !urls.is_empty() {
            tracing::debug!("Found {} result cards with selector: {}", urls.len(), selector_str);
            return urls;
        }
        tracing::trace!("Selector '{}' found 0 result cards", selector_str);
    }

    Vec::new()
}

fn absolute_url(href: &str, base: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href.trim_start_matches('/'))
    }
}

fn first_match(root: &ElementRef, candidates: &[(&str, Source)]) -> Option<String> {
    candidates.iter().find_map(|(selector_str, source)| {
        let selector = Selector::parse(selector_str).ok()?;
        root.select(&selector)
            .filter_map(|element| read(&element, *source))
            .next()
    })
}

fn read(element: &ElementRef, source: Source) -> Option<String> {
    let raw = match source {
        Source::Text => element.text().collect::<Vec<_>>().join(" "),
        Source::Attr(name) => element.value().attr(name)?.to_string(),
    };
    let value = collapse_whitespace(&clean_text(&raw));
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Label/value pairs from `<dt>`/`<dd>` attribute lists, zipped by position
fn extract_attributes(root: &ElementRef) -> BTreeMap<String, String> {
    let (Ok(label_sel), Ok(value_sel)) = (Selector::parse("dt"), Selector::parse("dd")) else {
        return BTreeMap::new();
    };

    root.select(&label_sel)
        .zip(root.select(&value_sel))
        .filter_map(|(label, value)| {
            let label = read(&label, Source::Text)?;
            let value = read(&value, Source::Text)?;
            Some((label.trim_end_matches(':').to_string(), value))
        })
        .collect()
}
