use crate::config::{MapMode, OutputConfig};
use crate::models::ListingRecord;
use crate::normalize::{PriceTier, PriceTiers};
use crate::report::is_web_url;
use maud::{html, Markup, PreEscaped, DOCTYPE};

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
const CLUSTER_CSS: &str = "https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.css";
const CLUSTER_DEFAULT_CSS: &str = "https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.Default.css";
const CLUSTER_JS: &str = "https://unpkg.com/leaflet.markercluster@1.5.3/dist/leaflet.markercluster.js";

const POPUP_DESCRIPTION_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct MapOptions {
    pub title: String,
    pub center: [f64; 2],
    pub zoom: u8,
    pub clustered: bool,
    pub tiers: PriceTiers,
    /// Shown in the legend as the update date
    pub generated_at: String,
}

impl MapOptions {
    pub fn from_output(
        output: &OutputConfig,
        tiers: PriceTiers,
        generated_at: impl Into<String>,
    ) -> Self {
        Self {
            title: output.title.clone(),
            center: output.map_center,
            zoom: output.map_zoom,
            clustered: output.map_mode == MapMode::Clustered,
            tiers,
            generated_at: generated_at.into(),
        }
    }
}

/// Standalone Leaflet page with one circle marker per located record.
/// Records without coordinates are left out.
pub fn render_map(records: &[ListingRecord], options: &MapOptions) -> String {
    let markers: Vec<serde_json::Value> = records
        .iter()
        .filter_map(|record| {
            let coordinates = record.coordinates?;
            let tier = options.tiers.classify(&record.price);
            Some(serde_json::json!({
                "lat": coordinates.latitude,
                "lon": coordinates.longitude,
                "color": tier.color(),
                "popup": popup(record).into_string(),
            }))
        })
        .collect();

    tracing::info!("Creating map with {} listings with coordinates", markers.len());

    let script = map_script(&markers, options);

    let page = html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (options.title) }
                link rel="stylesheet" href=(LEAFLET_CSS);
                @if options.clustered {
                    link rel="stylesheet" href=(CLUSTER_CSS);
                    link rel="stylesheet" href=(CLUSTER_DEFAULT_CSS);
                }
                style {
                    "html, body { height: 100%; margin: 0; } #map { height: 100%; }"
                }
                script src=(LEAFLET_JS) {}
                @if options.clustered {
                    script src=(CLUSTER_JS) {}
                }
            }
            body {
                div id="map" {}
                (legend(options))
                script { (PreEscaped(script)) }
            }
        }
    };

    page.into_string()
}

fn map_script(markers: &[serde_json::Value], options: &MapOptions) -> String {
    // "</" inside a JSON string would close the surrounding script element
    let data = serde_json::Value::Array(markers.to_vec())
        .to_string()
        .replace("</", "<\\/");

    let layer = if options.clustered {
        "L.markerClusterGroup()"
    } else {
        "L.layerGroup()"
    };

    format!(
        r#"
var map = L.map('map').setView([{lat}, {lon}], {zoom});
L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
    maxZoom: 19,
    attribution: '&copy; OpenStreetMap contributors'
}}).addTo(map);
var listings = {layer};
{data}.forEach(function (m) {{
    L.circleMarker([m.lat, m.lon], {{
        radius: 8, color: m.color, fillColor: m.color, fillOpacity: 0.8, weight: 1
    }}).bindPopup(m.popup, {{maxWidth: 320}}).addTo(listings);
}});
map.addLayer(listings);
"#,
        lat = options.center[0],
        lon = options.center[1],
        zoom = options.zoom,
        layer = layer,
        data = data,
    )
}

fn popup(record: &ListingRecord) -> Markup {
    html! {
        div style="width: 280px; max-width: 90vw; font-family: -apple-system, 'Segoe UI', Roboto, sans-serif;" {
            h3 style="margin: 0 0 8px; font-size: 16px;" { (record.title) }
            div style="background: #10b981; color: white; padding: 4px 10px; border-radius: 12px; font-weight: 700; display: inline-block;" {
                (record.price)
            }
            p style="margin: 8px 0 4px; color: #334155;" { "📍 " (record.address) }
            @let info = record.info();
            @if !info.is_empty() {
                p style="margin: 4px 0; color: #334155; font-size: 13px;" { (info) }
            }
            p style="margin: 4px 0 8px; color: #475569; font-size: 12px; font-style: italic;" {
                (record.short_description(POPUP_DESCRIPTION_CHARS))
            }
            @if is_web_url(&record.url) {
                a href=(record.url) target="_blank" rel="noopener" { "View on Kijiji →" }
            }
        }
    }
}

fn legend(options: &MapOptions) -> Markup {
    html! {
        div style="position: fixed; bottom: 24px; left: 12px; z-index: 1000; background: white; padding: 10px 12px; border-radius: 6px; box-shadow: 0 2px 8px rgba(0,0,0,0.2); font: 13px sans-serif;" {
            strong { "Rental places updated on " (options.generated_at) }
            @for tier in PriceTier::ALL {
                div {
                    span style={ "display: inline-block; width: 12px; height: 12px; border-radius: 50%; margin-right: 6px; background: " (tier.color()) ";" } {}
                    (options.tiers.label(tier))
                }
            }
        }
    }
}
