//! Turns a rendered listing page into a [`ListingRecord`].
//!
//! Extraction is best effort: a field that cannot be found keeps the
//! [`NOT_AVAILABLE`] placeholder and the rest of the record is still filled.

use super::agents::extract_agents;
use crate::models::{ListingRecord, NOT_AVAILABLE};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;

static META_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).expect("valid selector"));
static DESCRIPTION_SPANS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"div[data-tn="uc-listing-description"] span"#).expect("valid selector")
});
static DESCRIPTION_CONTAINER: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"div[data-tn="uc-listing-description"]"#).expect("valid selector")
});
static HERO_IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img#media-gallery-hero-image").expect("valid selector"));
static CAROUSEL_IMAGES: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img[data-flickity-lazyload-src]").expect("valid selector"));

static ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?)(?: is a single family home| is a townhome)").expect("valid regex")
});
static PRICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"listed for sale at (\$\d{1,3}(?:,\d{3})*)").expect("valid regex"));
static BEDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)-bed").expect("valid regex"));
static BATHS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)-bath").expect("valid regex"));
static SQFT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}(?:,\d{3})*) sqft").expect("valid regex"));

/// Fields carried by the page's meta description summary
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MetaSummary {
    pub address: Option<String>,
    pub price: Option<String>,
    pub beds: Option<String>,
    pub baths: Option<String>,
    pub sqft: Option<String>,
}

fn first_group(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a summary like "12 Oak Ln, Bethesda, MD 20817 is a single family
/// home listed for sale at $2,450,000. This 5-bed, 4-bath, 4,800 sqft ..."
pub fn parse_meta_summary(content: &str) -> MetaSummary {
    MetaSummary {
        address: first_group(&ADDRESS, content),
        price: first_group(&PRICE, content),
        beds: first_group(&BEDS, content),
        baths: first_group(&BATHS, content),
        sqft: first_group(&SQFT, content),
    }
}

/// Build a record from a listing page. Never fails; missing fields stay "N/A".
pub fn extract_listing(listing_url: &str, html: &str) -> ListingRecord {
    let document = Html::parse_document(html);
    let mut record = ListingRecord::empty(listing_url);

    match document
        .select(&META_DESCRIPTION)
        .find_map(|m| m.value().attr("content"))
    {
        Some(content) => {
            let meta = parse_meta_summary(content);
            let or_na = |v: Option<String>| v.unwrap_or_else(|| NOT_AVAILABLE.to_string());
            record.address = or_na(meta.address);
            record.price = or_na(meta.price);
            record.beds = or_na(meta.beds);
            record.baths = or_na(meta.baths);
            record.sqft = or_na(meta.sqft);
        }
        None => debug!("No meta description on {listing_url}"),
    }

    if let Some(description) = description(&document) {
        record.description = description;
    }
    record.agents = extract_agents(&document);
    record.image_urls = image_urls(&document);
    record
}

/// Space-joined text of the description spans; `None` when the container is absent
fn description(document: &Html) -> Option<String> {
    document.select(&DESCRIPTION_CONTAINER).next()?;
    let text = document
        .select(&DESCRIPTION_SPANS)
        .map(|span| span.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Some(text)
}

/// Hero image first, then carousel images in page order, without repeats
fn image_urls(document: &Html) -> Vec<String> {
    let hero = document
        .select(&HERO_IMAGE)
        .filter_map(|img| img.value().attr("src"));
    let carousel = document
        .select(&CAROUSEL_IMAGES)
        .filter_map(|img| img.value().attr("data-flickity-lazyload-src"));
    dedupe_urls(hero.chain(carousel).map(str::to_string))
}

/// Drop repeated and blank URLs, keeping the first occurrence of each
pub fn dedupe_urls(urls: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|u| !u.trim().is_empty() && seen.insert(u.clone()))
        .collect()
}
