//! Listing extraction from `<script type="application/ld+json">` blocks.
//!
//! Search pages embed an `ItemList` whose `itemListElement` entries each
//! carry an `item` describing one rental. Every block is parsed on its own so
//! a malformed block never hides the listings of its siblings.

use crate::models::{Coordinates, ListingRecord, Price, NO_ADDRESS, NO_DESCRIPTION, NO_TITLE};
use scraper::{Html, Selector};
use serde_json::Value;

const SCRIPT_SELECTOR: &str = "script[type='application/ld+json']";

/// JSON-LD key → attribute label, in the order the site documents them
const ATTRIBUTE_KEYS: [(&str, &str); 3] = [
    ("numberOfBedrooms", "Bedrooms"),
    ("numberOfBathroomsTotal", "Bathrooms"),
    ("leaseLength", "Lease Length"),
];

/// Extract every listing described by the page's structured data.
pub fn extract_listings(html: &str) -> Vec<ListingRecord> {
    let mut listings = Vec::new();

    for (index, block) in script_blocks(html).iter().enumerate() {
        let value: Value = match serde_json::from_str(block) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("Skipping malformed JSON-LD block #{}: {}", index + 1, e);
                continue;
            }
        };

        for list in item_lists(&value) {
            for element in list {
                let Some(item) = element.get("item") else {
                    tracing::trace!("itemListElement entry without 'item', skipping");
                    continue;
                };
                match listing_from_item(item) {
                    Some(listing) => listings.push(listing),
                    None => tracing::debug!("JSON-LD item without URL, skipping"),
                }
            }
        }
    }

    tracing::debug!("Extracted {} listings from structured data", listings.len());
    listings
}

/// Whether the page carries at least one parseable item list
pub fn has_structured_data(html: &str) -> bool {
    script_blocks(html).iter().any(|block| {
        serde_json::from_str::<Value>(block)
            .map(|value| !item_lists(&value).is_empty())
            .unwrap_or(false)
    })
}

fn script_blocks(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(SCRIPT_SELECTOR) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(|script| script.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect()
}

/// Collect the `itemListElement` arrays of a block. The block may be the list
/// itself, an array of nodes, or an `@graph` container.
fn item_lists(value: &Value) -> Vec<&Vec<Value>> {
    let mut nodes: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let graphs: Vec<&Value> = nodes
        .iter()
        .filter_map(|node| node.get("@graph").and_then(Value::as_array))
        .flatten()
        .collect();
    nodes.extend(graphs);

    nodes
        .into_iter()
        .filter_map(|node| node.get("itemListElement").and_then(Value::as_array))
        .collect()
}

fn listing_from_item(item: &Value) -> Option<ListingRecord> {
    let url = item
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())?;

    let mut listing = ListingRecord::new(url);
    listing.title = string_field(item, "name").unwrap_or_else(|| NO_TITLE.to_string());
    listing.description =
        string_field(item, "description").unwrap_or_else(|| NO_DESCRIPTION.to_string());
    listing.price = extract_price(item);
    listing.address = extract_address(item);
    listing.coordinates = extract_geo(item);

    for (key, label) in ATTRIBUTE_KEYS {
        if let Some(value) = item.get(key).and_then(scalar_text) {
            listing.attributes.insert(label.to_string(), value);
        }
    }
    if let Some(size) = item
        .get("floorSize")
        .and_then(|size| size.get("value"))
        .and_then(scalar_text)
    {
        listing.attributes.insert("Size (sq ft)".to_string(), size);
    }
    if let Some(pets) = item.get("petsAllowed") {
        let allowed = match pets {
            Value::Bool(b) => *b,
            Value::String(s) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };
        let label = if allowed { "Yes" } else { "No" };
        listing.attributes.insert("Pets Allowed".to_string(), label.to_string());
    }

    Some(listing)
}

fn extract_price(item: &Value) -> Price {
    let offers = match item.get("offers") {
        // Some pages publish a list of offers; the first one is the asking price
        Some(Value::Array(offers)) => offers.first(),
        other => other,
    };

    offers
        .and_then(|offer| offer.get("price"))
        .and_then(scalar_text)
        .map(|price| {
            if price.starts_with('$') {
                Price::Listed(price)
            } else {
                Price::Listed(format!("${}", price))
            }
        })
        .unwrap_or(Price::Unavailable)
}

fn extract_address(item: &Value) -> String {
    let address = match item.get("address") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(obj @ Value::Object(_)) => string_field(obj, "streetAddress"),
        _ => None,
    };

    address
        .map(|a| clean_text(&a))
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| NO_ADDRESS.to_string())
}

fn extract_geo(item: &Value) -> Option<Coordinates> {
    let geo = item.get("geo")?;
    let latitude = number_field(geo.get("latitude")?)?;
    let longitude = number_field(geo.get("longitude")?)?;
    Some(Coordinates::new(latitude, longitude)).filter(Coordinates::is_valid)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(clean_text)
        .filter(|s| !s.is_empty())
}

/// Render a scalar JSON value as text. Objects holding a `value` (QuantitativeValue)
/// are unwrapped.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(clean_text(s)).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(_) => value.get("value").and_then(scalar_text),
        _ => None,
    }
}

fn number_field(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// Undo the HTML entities the site leaves inside JSON-LD strings
pub fn clean_text(text: &str) -> String {
    text.replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(blocks: &[&str]) -> String {
        let scripts: String = blocks
            .iter()
            .map(|b| format!(r#"<script type="application/ld+json">{}</script>"#, b))
            .collect();
        format!("<html><head>{}</head><body></body></html>", scripts)
    }

    const TWO_ITEMS: &str = r#"{
        "@context": "https://schema.org",
        "@type": "ItemList",
        "itemListElement": [
            {"@type": "ListItem", "position": 1, "item": {
                "name": "Bright 2 bedroom downtown",
                "url": "https://www.kijiji.ca/v-apartments-condos/st-johns/1001",
                "description": "Heat and light included",
                "offers": {"price": "950", "priceCurrency": "CAD"},
                "address": {"streetAddress": "5 Water St", "addressLocality": "St. John&apos;s"},
                "geo": {"latitude": 47.5615, "longitude": -52.7126},
                "numberOfBedrooms": "2",
                "numberOfBathroomsTotal": 1,
                "floorSize": {"value": 750, "unitCode": "FTK"},
                "petsAllowed": "true",
                "leaseLength": "1 Year"
            }},
            {"@type": "ListItem", "position": 2, "item": {
                "name": "Basement apartment",
                "url": "https://www.kijiji.ca/v-apartments-condos/st-johns/1002",
                "address": "10 Main St"
            }}
        ]
    }"#;

    #[test]
    fn test_extracts_full_and_sparse_items() {
        let listings = extract_listings(&page(&[TWO_ITEMS]));
        assert_eq!(listings.len(), 2);

        let first = &listings[0];
        assert_eq!(first.title, "Bright 2 bedroom downtown");
        assert_eq!(first.price, Price::Listed("$950".to_string()));
        assert_eq!(first.address, "5 Water St");
        assert_eq!(first.coordinates, Some(Coordinates::new(47.5615, -52.7126)));
        assert_eq!(first.attributes.get("Bedrooms").map(String::as_str), Some("2"));
        assert_eq!(first.attributes.get("Bathrooms").map(String::as_str), Some("1"));
        assert_eq!(first.attributes.get("Size (sq ft)").map(String::as_str), Some("750"));
        assert_eq!(first.attributes.get("Pets Allowed").map(String::as_str), Some("Yes"));
        assert_eq!(first.attributes.get("Lease Length").map(String::as_str), Some("1 Year"));

        let second = &listings[1];
        assert_eq!(second.address, "10 Main St");
        assert_eq!(second.price, Price::Unavailable);
        assert_eq!(second.description, NO_DESCRIPTION);
        assert!(second.coordinates.is_none());
        assert!(second.attributes.is_empty());
    }

    #[test]
    fn test_malformed_block_does_not_hide_siblings() {
        let html = page(&["{ this is not json", TWO_ITEMS, r#"{"@type": "Organization"}"#]);
        let listings = extract_listings(&html);
        assert_eq!(listings.len(), 2);
        assert!(listings.iter().all(|l| !l.url.is_empty()));
    }

    #[test]
    fn test_items_without_url_are_dropped() {
        let block = r#"{"itemListElement": [
            {"item": {"name": "No link"}},
            {"item": {"name": "Blank link", "url": "  "}},
            {"position": 3},
            {"item": {"url": "https://www.kijiji.ca/v-room-rental/9"}}
        ]}"#;
        let listings = extract_listings(&page(&[block]));
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].title, NO_TITLE);
        assert_eq!(listings[0].url, "https://www.kijiji.ca/v-room-rental/9");
    }

    #[test]
    fn test_partial_geo_is_ignored() {
        let block = r#"{"itemListElement": [{"item": {
            "url": "https://example.com/1",
            "geo": {"latitude": "47.5"}
        }}]}"#;
        let listings = extract_listings(&page(&[block]));
        assert!(listings[0].coordinates.is_none());
    }

    #[test]
    fn test_string_geo_and_numeric_price() {
        let block = r#"{"itemListElement": [{"item": {
            "url": "https://example.com/1",
            "offers": {"price": 1250},
            "geo": {"latitude": "47.56", "longitude": "-52.70"},
            "petsAllowed": false
        }}]}"#;
        let listings = extract_listings(&page(&[block]));
        assert_eq!(listings[0].price, Price::Listed("$1250".to_string()));
        assert_eq!(listings[0].coordinates, Some(Coordinates::new(47.56, -52.70)));
        assert_eq!(listings[0].attributes.get("Pets Allowed").map(String::as_str), Some("No"));
    }

    #[test]
    fn test_graph_container() {
        let block = r#"{"@graph": [{"@type": "ItemList", "itemListElement": [
            {"item": {"url": "https://example.com/graph"}}
        ]}]}"#;
        let listings = extract_listings(&page(&[block]));
        assert_eq!(listings.len(), 1);
        assert!(has_structured_data(&page(&[block])));
    }

    #[test]
    fn test_page_without_structured_data() {
        let html = "<html><body><div class='search-item'></div></body></html>";
        assert!(extract_listings(html).is_empty());
        assert!(!has_structured_data(html));
        assert!(!has_structured_data(&page(&["{broken"])));
    }

    #[test]
    fn test_clean_text_unescapes_entities() {
        assert_eq!(clean_text(" St. John&apos;s &amp; area "), "St. John's & area");
    }
}
