//! Caption layout: header lines, prompt text, deterministic captions and the
//! format check applied to generated ones.

use crate::address::canonicalize;
use crate::models::{ListingRecord, NOT_AVAILABLE};

/// Upper bound on words after the header
pub const MAX_CONTENT_WORDS: usize = 150;

const ADDRESS_MARKER: &str = "📍";
const PRICE_MARKER: &str = "💰";
const SIZE_MARKER: &str = "🏡";
const AGENT_PREFIX: &str = "Listed by:";

const DEFAULT_FEATURES: &str = "luxury finishes, premium location";
const MAX_FEATURES: usize = 5;

const NOTABLE_KEYWORDS: [&str; 50] = [
    "waterfront",
    "beachfront",
    "ocean view",
    "mountain view",
    "lake view",
    "river view",
    "panoramic",
    "historic",
    "award winning",
    "architect",
    "custom built",
    "newly renovated",
    "newly built",
    "infinity pool",
    "private pool",
    "tennis court",
    "wine cellar",
    "home theater",
    "gym",
    "smart home",
    "gated community",
    "chef's kitchen",
    "gourmet kitchen",
    "spa bathroom",
    "primary suite",
    "hardwood floors",
    "marble",
    "granite",
    "stainless steel",
    "double height",
    "cathedral ceiling",
    "private dock",
    "garage",
    "car enthusiast",
    "guest house",
    "outdoor kitchen",
    "fireplace",
    "rooftop",
    "balcony",
    "terrace",
    "garden",
    "landscaped",
    "acreage",
    "elevator",
    "generator",
    "security system",
    "home office",
    "library",
    "recreation room",
    "media room",
];

pub const SYSTEM_PROMPT: &str = "You are a luxury real estate social media expert who creates \
engaging, conversational captions that highlight what makes each property special without \
sounding pretentious.";

/// `Listed by: names (companies)`, only when both sides are known
pub fn agent_line(record: &ListingRecord) -> Option<String> {
    let names = record.agent_names();
    let companies = record.agent_companies();
    if names == NOT_AVAILABLE || companies == NOT_AVAILABLE {
        return None;
    }
    Some(format!("{AGENT_PREFIX} {names} ({companies})"))
}

/// The three or four marker lines every caption starts with
pub fn header(record: &ListingRecord) -> String {
    let mut header = format!(
        "{ADDRESS_MARKER} {}\n{PRICE_MARKER} {}\n{SIZE_MARKER} {} Beds | 🛁 {} Baths | 📏 {} Sq Ft",
        record.address, record.price, record.beds, record.baths, record.sqft
    );
    if let Some(agents) = agent_line(record) {
        header.push('\n');
        header.push_str(&agents);
    }
    header
}

/// Up to five selling points named in the description
pub fn notable_features(description: &str) -> String {
    let lower = description.to_lowercase();
    let found: Vec<&str> = NOTABLE_KEYWORDS
        .iter()
        .copied()
        .filter(|k| lower.contains(k))
        .take(MAX_FEATURES)
        .collect();
    if found.is_empty() {
        DEFAULT_FEATURES.to_string()
    } else {
        found.join(", ")
    }
}

/// City word of an address like `12 Oak Ln, Bethesda, MD 20817`
pub fn location(address: &str) -> String {
    let parts: Vec<&str> = address.split(',').collect();
    if parts.len() >= 2 {
        if let Some(city) = parts[parts.len() - 2].split_whitespace().next() {
            return city.to_string();
        }
    }
    "this area".to_string()
}

/// Closing line, picked by address so the same listing always gets the same one
pub fn call_to_action(address: &str) -> String {
    let location = location(address);
    let templates = [
        format!("Follow us for more amazing luxury homes in {location} that'll make your jaw drop."),
        format!("Hit follow to see more dream homes in {location} that you'll want to move into immediately."),
        format!("Want to see more stunning {location} properties? Follow our page for daily luxury home inspiration."),
        format!("Don't miss out on more incredible {location} estates, tap that follow button for your daily dose of luxury."),
        format!("For more {location} dream homes that'll give you serious real estate envy, follow our page!"),
    ];
    let seed: usize = canonicalize(address).bytes().map(usize::from).sum();
    templates[seed % templates.len()].clone()
}

/// Caption built from the record alone
pub fn mock_caption(record: &ListingRecord) -> String {
    let features = notable_features(&record.description);
    format!(
        "{}\n\nThis {}-bed, {}-bath home brings {features} together in one address worth a closer look.\n\n\
         Inside, {} square feet of space leave plenty of room for everyday living and entertaining.\n\n{}",
        header(record),
        record.beds,
        record.baths,
        record.sqft,
        call_to_action(&record.address)
    )
}

/// Caption used when generation keeps failing
pub fn fallback_caption(record: &ListingRecord) -> String {
    format!(
        "{}\n\nThis stunning property combines luxury with comfort in a prime location.\n\n\
         Inside you'll find high-end finishes and thoughtful design that elevates everyday living.\n\n{}",
        header(record),
        call_to_action(&record.address)
    )
}

pub fn build_prompt(record: &ListingRecord) -> String {
    let features = notable_features(&record.description);
    let cta = call_to_action(&record.address);
    format!(
        "Create an Instagram caption for this luxury real estate listing. The goal is content that \
makes people want to follow a luxury real estate page.

FORMAT REQUIREMENTS:
- STRICT WORD COUNT: 120-{MAX_CONTENT_WORDS} words maximum, not including the header
- EXACT STRUCTURE:
  1. Header (formatted exactly as shown below)
  2. Paragraph about the property's standout external features (1-2 sentences)
  3. Paragraph about interior features (1-2 sentences)
  4. Call-to-action paragraph (exactly 1 sentence)
- Separate paragraphs with one blank line.

THE HEADER MUST BE FORMATTED EXACTLY LIKE THIS:
{header}

CALL-TO-ACTION:
End with this specific CTA: \"{cta}\"

CONTENT GUIDELINES:
- Use conversational, slightly casual language
- Focus on lifestyle benefits, not just features
- Highlight these specific features if relevant: {features}
- Be concise, short sentences have more impact
- Include only the most impressive 2-3 features

AVOID:
- Flowery or overly formal language
- Real estate cliches like \"luxury living\" or \"breathtaking views\"
- Mentioning investment potential
- Going over the word count limit

Property Description:
{description}",
        header = header(record),
        description = record.description,
    )
}

/// Check a generated caption's layout. The error names the first rule broken.
pub fn validate(caption: &str) -> Result<(), String> {
    let lines: Vec<&str> = caption.split('\n').collect();
    if lines.len() < 4 {
        return Err("caption is shorter than its header".into());
    }
    if !lines[0].starts_with(ADDRESS_MARKER) {
        return Err("first line is not the address line".into());
    }
    if !lines[1].starts_with(PRICE_MARKER) {
        return Err("second line is not the price line".into());
    }
    let size = lines[2];
    if !size.starts_with(SIZE_MARKER) || !size.contains("Beds") || !size.contains("Baths") {
        return Err("third line is not the beds/baths line".into());
    }

    let start = if lines[3].starts_with(AGENT_PREFIX) { 4 } else { 3 };
    if lines.len() <= start {
        return Err("no content after the header".into());
    }

    let content = lines[start..].join("\n");
    let paragraphs = content.split("\n\n").filter(|p| !p.trim().is_empty()).count();
    if paragraphs != 3 {
        return Err(format!("expected 3 paragraphs, found {paragraphs}"));
    }

    let words = content.split_whitespace().count();
    if words > MAX_CONTENT_WORDS {
        return Err(format!("{words} words exceeds {MAX_CONTENT_WORDS}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Agent;

    fn record() -> ListingRecord {
        let mut record = ListingRecord::empty("https://www.compass.com/listing/1");
        record.address = "123 Main St, Bethesda, MD 20817".into();
        record.price = "$5,000,000".into();
        record.beds = "6".into();
        record.baths = "5".into();
        record.sqft = "5,000".into();
        record.description =
            "This waterfront property features a home theater and infinity pool.".into();
        record
    }

    #[test]
    fn header_has_agent_line_only_when_known() {
        let mut r = record();
        assert_eq!(header(&r).lines().count(), 3);

        r.agents.push(Agent {
            name: "John Smith".into(),
            company: "Luxury Real Estate".into(),
        });
        let h = header(&r);
        assert_eq!(h.lines().last(), Some("Listed by: John Smith (Luxury Real Estate)"));
    }

    #[test]
    fn features_follow_keyword_order_and_cap() {
        assert_eq!(
            notable_features(&record().description),
            "waterfront, infinity pool, home theater"
        );
        assert_eq!(notable_features("A cozy home."), DEFAULT_FEATURES);
        let many = "waterfront beachfront panoramic historic marble granite garage";
        assert_eq!(notable_features(many).split(", ").count(), 5);
    }

    #[test]
    fn location_is_city_word() {
        assert_eq!(location("123 Main St, Bethesda, MD 20817"), "Bethesda");
        assert_eq!(location("1 Elm, Chevy Chase, MD"), "Chevy");
        assert_eq!(location("No commas here"), "this area");
    }

    #[test]
    fn cta_is_stable_per_address() {
        let a = call_to_action("123 Main St, Bethesda, MD 20817");
        assert_eq!(a, call_to_action("123 Main St, Bethesda, MD 20817"));
        assert_eq!(a, call_to_action("123 Main Street, Bethesda, MD 20817"));
        assert!(a.contains("Bethesda"));
        assert!(call_to_action("N/A").contains("this area"));
    }

    #[test]
    fn mock_and_fallback_pass_validation() {
        let mut r = record();
        assert_eq!(validate(&mock_caption(&r)), Ok(()));
        assert_eq!(validate(&fallback_caption(&r)), Ok(()));

        r.agents.push(Agent {
            name: "Jane Doe".into(),
            company: "Compass".into(),
        });
        assert_eq!(validate(&mock_caption(&r)), Ok(()));
        assert_eq!(validate(&fallback_caption(&r)), Ok(()));
    }

    #[test]
    fn missing_price_line_is_rejected() {
        let caption = "📍 1 Elm St\n🏡 3 Beds | 🛁 2 Baths | 📏 900 Sq Ft\n\nOne.\n\nTwo.\n\nThree.";
        assert!(validate(caption).unwrap_err().contains("price"));
    }

    #[test]
    fn paragraph_count_and_word_bound_are_enforced() {
        let head = "📍 1 Elm St\n💰 $1\n🏡 3 Beds | 🛁 2 Baths | 📏 900 Sq Ft";
        assert!(validate(&format!("{head}\n\nOne.\n\nTwo.\n\nThree.")).is_ok());
        assert!(validate(&format!("{head}\n\nOne.\n\nTwo.")).is_err());

        let long = vec!["word"; 149].join(" ");
        assert!(validate(&format!("{head}\n\n{long}\n\nTwo.\n\nThree.")).is_err());
        let short = vec!["word"; 148].join(" ");
        assert!(validate(&format!("{head}\n\n{short}\n\nTwo.")).is_err());
        assert!(validate(&format!("{head}\n\n{short}\n\nTwo\n\nThree.")).is_ok());
    }
}
