//! Listing agent extraction.
//!
//! Listing pages credit agents in one of three layouts. Each layout has its
//! own strategy; strategies run in order and the first one that finds anyone
//! wins.

use crate::models::Agent;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;

type Strategy = fn(&Html) -> Vec<Agent>;

const STRATEGIES: [(&str, Strategy); 3] = [
    ("contact links", from_contact_links),
    ("listed-by block", from_listed_by_blocks),
    ("page text", from_page_text),
];

static AGENT_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[data-tn='contactAgent-link-name']").expect("valid selector"));
static AGENT_CAPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p.textIntent-caption1").expect("valid selector"));
static LISTED_BY_BLOCK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "li[data-tn='listing-page-listed-by-agents], \
         div.non-compass-contact-agent-slat__StyledSlatContainer-sc-10f1rjd-0",
    )
    .expect("valid selector")
});

/// `Listed by | Agent • Company`, `Agent • Company`, `Listed by Agent · Company`
static BLOCK_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"Listed by\s*\|\s*(.*?)\s*•\s*(.*)").expect("valid regex"),
        Regex::new(r"([^•·|]+)(?:•|·)\s*(.*)").expect("valid regex"),
        Regex::new(r"Listed by\s+(.*?)\s*·\s*(.*)").expect("valid regex"),
    ]
});
static TRAILING_SYMBOLS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s&'-]+$").expect("valid regex"));
static TEXT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Listed by (.+?) · (.+)").expect("valid regex"));

/// Agents credited on a listing page, unique by name, in page order
pub fn extract_agents(document: &Html) -> Vec<Agent> {
    for (name, strategy) in STRATEGIES {
        let agents = unique_by_name(strategy(document));
        if !agents.is_empty() {
            debug!("Found {} agents via {name}", agents.len());
            return agents;
        }
    }
    Vec::new()
}

fn unique_by_name(agents: Vec<Agent>) -> Vec<Agent> {
    let mut seen = HashSet::new();
    agents
        .into_iter()
        .filter(|a| !a.name.is_empty() && seen.insert(a.name.clone()))
        .collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Structured agent cards: name links paired with their brokerage captions
fn from_contact_links(document: &Html) -> Vec<Agent> {
    document
        .select(&AGENT_LINK)
        .zip(document.select(&AGENT_CAPTION))
        .map(|(name, company)| Agent {
            name: element_text(name),
            company: element_text(company)
                .replace("Listed By ", "")
                .trim()
                .to_string(),
        })
        .collect()
}

/// Company text ends where contact details begin
fn cut_contact_details(company: &str) -> &str {
    let end = ["|", "P:", "Phone:"]
        .iter()
        .filter_map(|marker| company.find(marker))
        .min()
        .unwrap_or(company.len());
    company[..end].trim()
}

/// Agent and company from one "Listed by" block
pub fn parse_listed_by(text: &str) -> Option<Agent> {
    let captures = BLOCK_PATTERNS.iter().find_map(|p| p.captures(text))?;
    let name = captures
        .get(1)?
        .as_str()
        .replace("Listed by", "")
        .trim()
        .to_string();
    let company = cut_contact_details(captures.get(2)?.as_str());
    let company = TRAILING_SYMBOLS.replace(company, "").trim().to_string();

    if name.is_empty() || company.is_empty() {
        return None;
    }
    Some(Agent { name, company })
}

/// Loosely structured blocks used for agents from other brokerages
fn from_listed_by_blocks(document: &Html) -> Vec<Agent> {
    document
        .select(&LISTED_BY_BLOCK)
        .filter_map(|block| {
            let text = element_text(block);
            debug!("Listed-by block: {text}");
            parse_listed_by(&text)
        })
        .collect()
}

/// Any text on the page of the form `Listed by Agent · Company`
fn from_page_text(document: &Html) -> Vec<Agent> {
    document
        .root_element()
        .text()
        .filter_map(|text| {
            let captures = TEXT_PATTERN.captures(text.trim())?;
            let company = captures[2].split('|').next().unwrap_or_default().trim();
            Some(Agent {
                name: captures[1].trim().to_string(),
                company: company.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agents(html: &str) -> Vec<(String, String)> {
        extract_agents(&Html::parse_document(html))
            .into_iter()
            .map(|a| (a.name, a.company))
            .collect()
    }

    fn pair(name: &str, company: &str) -> (String, String) {
        (name.to_string(), company.to_string())
    }

    #[test]
    fn contact_links_pair_with_captions() {
        let html = r#"
            <a data-tn="contactAgent-link-name">Jane Doe</a>
            <p class="textIntent-caption1">Listed By Compass</p>
            <a data-tn="contactAgent-link-name">John Roe</a>
            <p class="textIntent-caption1">Compass</p>
            <a data-tn="contactAgent-link-name">Jane Doe</a>
            <p class="textIntent-caption1">Compass</p>
        "#;
        assert_eq!(
            agents(html),
            vec![pair("Jane Doe", "Compass"), pair("John Roe", "Compass")]
        );
    }

    #[test]
    fn listed_by_block_used_when_no_contact_links() {
        let html = r#"
            <ul><li data-tn="listing-page-listed-by-agents">
                <span>Listed by</span> | <span>Sam Lee</span> • <span>Long &amp; Foster</span>
                | <span>P: 301-555-0100</span>
            </li></ul>
        "#;
        assert_eq!(agents(html), vec![pair("Sam Lee", "Long & Foster")]);
    }

    #[test]
    fn block_patterns_cover_each_layout() {
        let a = parse_listed_by("Listed by | Ann Park • TTR Sotheby's International Realty Phone: 555").unwrap();
        assert_eq!(a.name, "Ann Park");
        assert_eq!(a.company, "TTR Sotheby's International Realty");

        let b = parse_listed_by("Bo Chen · Redfin Corp.").unwrap();
        assert_eq!(b.name, "Bo Chen");
        assert_eq!(b.company, "Redfin Corp");

        let c = parse_listed_by("Listed by Cy Diaz · RE/MAX").unwrap();
        assert_eq!(c.name, "Cy Diaz");
        assert_eq!(c.company, "RE/MAX");

        assert!(parse_listed_by("No agent here").is_none());
    }

    #[test]
    fn page_text_is_last_resort() {
        let html = r#"<div><p>Great house</p><div>Listed by Dee Evans · Weichert | dee@example.com</div></div>"#;
        assert_eq!(agents(html), vec![pair("Dee Evans", "Weichert")]);
    }

    #[test]
    fn no_agents_anywhere() {
        assert!(agents("<html><body><p>Nothing</p></body></html>").is_empty());
    }
}
