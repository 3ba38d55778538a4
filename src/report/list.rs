use crate::models::ListingRecord;
use crate::report::is_web_url;
use maud::{html, DOCTYPE};

const LIST_DESCRIPTION_CHARS: usize = 300;

const STYLE: &str = "
body { font-family: Arial, sans-serif; margin: 20px; }
.listing { border: 1px solid #ddd; margin: 10px 0; padding: 15px; border-radius: 5px; }
.title { font-size: 18px; font-weight: bold; color: #333; }
.price { font-size: 16px; color: #2c5aa0; font-weight: bold; }
.address { color: #666; }
.info { color: #555; font-size: 14px; }
.description { color: #777; font-size: 13px; margin-top: 10px; }
.link { color: #2c5aa0; text-decoration: none; }
";

/// Plain HTML list of every record, located or not
pub fn render_list(records: &[ListingRecord], title: &str, generated_at: &str) -> String {
    let page = html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (title) }
                style { (STYLE) }
            }
            body {
                h1 { (title) }
                p { "Generated on: " (generated_at) }
                p { "Total listings: " (records.len()) }
                @for record in records {
                    div class="listing" {
                        div class="title" { (record.title) }
                        div class="price" { (record.price) }
                        div class="address" { (record.address) }
                        div class="info" { (record.info()) }
                        div class="description" {
                            (record.short_description(LIST_DESCRIPTION_CHARS))
                        }
                        @if is_web_url(&record.url) {
                            a class="link" href=(record.url) target="_blank" { "View on Kijiji" }
                        }
                    }
                }
            }
        }
    };

    page.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Price;

    #[test]
    fn test_lists_every_record() {
        let mut first = ListingRecord::new("https://www.kijiji.ca/v/1");
        first.title = "Room & board".to_string();
        first.price = Price::Amount(650.0);
        let second = ListingRecord::new("https://www.kijiji.ca/v/2");

        let page = render_list(&[first, second], "Rentals", "2026-10-16 09:00:00");
        assert_eq!(page.matches("class=\"listing\"").count(), 2);
        assert!(page.contains("Total listings: 2"));
        assert!(page.contains("Room &amp; board"));
        assert!(page.contains("$650"));
        assert!(page.contains("Not available"));
        assert!(page.contains("href=\"https://www.kijiji.ca/v/2\""));
    }

    #[test]
    fn test_non_web_urls_get_no_link() {
        let page = render_list(
            &[ListingRecord::new("javascript:alert(1)")],
            "Rentals",
            "2026-10-16 09:00:00",
        );
        assert!(page.contains("Total listings: 1"));
        assert!(!page.contains("href=\"javascript:"));
        assert!(!page.contains("View on Kijiji"));
    }
}
