use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::HashSet;

pub const SITE_ROOT: &str = "https://www.compass.com";

static LISTING_CARD: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.uc-listingCard").expect("valid selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Listing page URLs on a feed page, in card order.
///
/// Only the first link of each card counts. Private exclusives and URLs in
/// `visited` are skipped; returned URLs are added to `visited`.
pub fn listing_urls(feed_html: &str, visited: &mut HashSet<String>) -> Vec<String> {
    let document = Html::parse_document(feed_html);
    let hrefs = document
        .select(&LISTING_CARD)
        .filter_map(|card| card.select(&LINK).next())
        .filter_map(|a| a.value().attr("href"));

    let mut urls = Vec::new();
    for href in hrefs {
        let url = absolute(href);
        if url.contains("/private-exclusives/") || !visited.insert(url.clone()) {
            continue;
        }
        urls.push(url);
    }
    urls
}

fn absolute(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{SITE_ROOT}{href}")
    }
}
