//! Works out which county a listing belongs to. The county names the
//! destination partition and the social account the listing is posted to.

use once_cell::sync::Lazy;
use regex::Regex;

pub const UNKNOWN_COUNTY: &str = "Unknown County";
const MONTGOMERY: &str = "Montgomery County";

/// URL slugs of Montgomery County towns
const MONTGOMERY_SLUGS: [&str; 6] = [
    "bethesda",
    "potomac",
    "chevy-chase",
    "rockville",
    "gaithersburg",
    "silver-spring",
];

/// Town names as they appear in addresses
const MONTGOMERY_TOWNS: [&str; 7] = [
    "Bethesda",
    "Potomac",
    "Chevy Chase",
    "Silver Spring",
    "Rockville",
    "Gaithersburg",
    "Kensington",
];

static URL_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"homes-for-sale/([a-zA-Z-]+)-md").expect("valid regex"),
        Regex::new(r"/listing/\d+-[a-zA-Z-]+-([a-zA-Z-]+)-md").expect("valid regex"),
    ]
});

fn title_case(slug: &str) -> String {
    slug.split(['-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// County named by a URL path segment such as `montgomery-county-md`
fn county_from_url(url: &str) -> Option<String> {
    URL_PATTERNS.iter().find_map(|pattern| {
        let name = title_case(pattern.captures(url)?.get(1)?.as_str());
        let name = name.strip_suffix(" County").unwrap_or(&name).trim();
        if name.is_empty() || name == "Md" {
            return None;
        }
        Some(format!("{name} County"))
    })
}

/// County for a listing, by precedence: a known town in the listing URL, a
/// county in the listing or feed URL, a known town in the address, else
/// [`UNKNOWN_COUNTY`].
pub fn resolve_county(listing_url: &str, feed_url: &str, address: &str) -> String {
    let lower = listing_url.to_lowercase();
    if MONTGOMERY_SLUGS.iter().any(|slug| lower.contains(slug)) {
        return MONTGOMERY.to_string();
    }

    if let Some(county) = county_from_url(listing_url).or_else(|| county_from_url(feed_url)) {
        return county;
    }

    if MONTGOMERY_TOWNS.iter().any(|town| address.contains(town)) {
        return MONTGOMERY.to_string();
    }

    UNKNOWN_COUNTY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn town_slug_in_listing_url() {
        assert_eq!(
            resolve_county("https://www.compass.com/listing/12-oak-ln-bethesda-md-20817/1/", "", "N/A"),
            "Montgomery County"
        );
    }

    #[test]
    fn county_from_feed_url() {
        assert_eq!(
            resolve_county(
                "https://www.compass.com/listing/5-main-st-annapolis-md-21401/9/",
                "https://www.compass.com/homes-for-sale/anne-arundel-county-md/",
                "5 Main St, Annapolis, MD"
            ),
            "Annapolis County"
        );
        assert_eq!(
            resolve_county(
                "https://www.compass.com/app/listing/9/",
                "https://www.compass.com/homes-for-sale/anne-arundel-county-md/",
                "N/A"
            ),
            "Anne Arundel County"
        );
    }

    #[test]
    fn address_town_when_urls_say_nothing() {
        assert_eq!(
            resolve_county("https://x/app/1", "https://x/feed", "3 Elm St, Kensington, MD 20895"),
            "Montgomery County"
        );
    }

    #[test]
    fn unknown_when_nothing_matches() {
        assert_eq!(resolve_county("https://x/1", "https://x/feed", "N/A"), UNKNOWN_COUNTY);
        assert_eq!(title_case("prince-georges"), "Prince Georges");
    }
}
