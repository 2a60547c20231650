use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder for a field that was looked for but not found on the page
pub const NOT_AVAILABLE: &str = "N/A";

/// Number of image link columns carried by a row when image upload is enabled
pub const IMAGE_SLOTS: usize = 10;

/// Fixed column order of a destination row
pub const BASE_COLUMNS: [&str; 11] = [
    "listing_url",
    "price",
    "address",
    "beds",
    "baths",
    "sqft",
    "description",
    "instagram_account",
    "instagram_caption",
    "listing_agents",
    "agent_company",
];

/// Index of the caption column inside [`BASE_COLUMNS`]
pub const CAPTION_COLUMN: usize = 8;

/// A listing agent and the brokerage they list under
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agent {
    pub name: String,
    pub company: String,
}

/// One scraped property listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRecord {
    pub listing_url: String,
    pub price: String,
    pub beds: String,
    pub baths: String,
    pub sqft: String,
    pub address: String,
    pub description: String,
    pub agents: Vec<Agent>,
    pub image_urls: Vec<String>,
    pub account_group: String,
    pub caption: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl ListingRecord {
    /// A record for `listing_url` with every scraped field set to [`NOT_AVAILABLE`]
    pub fn empty(listing_url: impl Into<String>) -> Self {
        Self {
            listing_url: listing_url.into(),
            price: NOT_AVAILABLE.to_string(),
            beds: NOT_AVAILABLE.to_string(),
            baths: NOT_AVAILABLE.to_string(),
            sqft: NOT_AVAILABLE.to_string(),
            address: NOT_AVAILABLE.to_string(),
            description: NOT_AVAILABLE.to_string(),
            agents: Vec::new(),
            image_urls: Vec::new(),
            account_group: NOT_AVAILABLE.to_string(),
            caption: None,
            scraped_at: Utc::now(),
        }
    }

    /// Name of the social account this listing is posted to
    pub fn instagram_account(&self) -> String {
        format!("Most Expensive Homes in {}", self.account_group)
    }

    /// Agent names joined with "; ", or [`NOT_AVAILABLE`] when none were found
    pub fn agent_names(&self) -> String {
        join_or_na(self.agents.iter().map(|a| a.name.as_str()))
    }

    /// Agent companies joined with "; ", aligned with [`ListingRecord::agent_names`]
    pub fn agent_companies(&self) -> String {
        join_or_na(self.agents.iter().map(|a| a.company.as_str()))
    }

    pub fn has_address(&self) -> bool {
        !self.address.trim().is_empty() && self.address != NOT_AVAILABLE
    }
}

fn join_or_na<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let joined = parts.collect::<Vec<_>>().join("; ");
    if joined.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        joined
    }
}

/// Column layout of a destination partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSchema {
    pub image_slots: usize,
}

impl RowSchema {
    pub fn new(with_images: bool) -> Self {
        Self {
            image_slots: if with_images { IMAGE_SLOTS } else { 0 },
        }
    }

    pub fn width(&self) -> usize {
        BASE_COLUMNS.len() + self.image_slots
    }

    pub fn header(&self) -> Vec<String> {
        let mut header: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        header.extend((1..=self.image_slots).map(|i| format!("image_{i}")));
        header
    }

    /// True when `existing` starts with every required column in order
    pub fn header_matches(&self, existing: &[String]) -> bool {
        let expected = self.header();
        existing.len() >= expected.len()
            && expected
                .iter()
                .zip(existing)
                .all(|(want, have)| want == have.trim())
    }

    /// Render a record as a row in fixed column order
    pub fn row(&self, record: &ListingRecord) -> Vec<String> {
        let mut row = vec![
            record.listing_url.clone(),
            record.price.clone(),
            record.address.clone(),
            record.beds.clone(),
            record.baths.clone(),
            record.sqft.clone(),
            record.description.clone(),
            record.instagram_account(),
            record
                .caption
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            record.agent_names(),
            record.agent_companies(),
        ];

        if self.image_slots > 0 {
            let mut images: Vec<String> = record
                .image_urls
                .iter()
                .take(self.image_slots)
                .cloned()
                .collect();
            images.resize(self.image_slots, String::new());
            row.extend(images);
        }

        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ListingRecord {
        let mut record = ListingRecord::empty("https://www.compass.com/listing/1");
        record.price = "$1,250,000".into();
        record.address = "12 Oak Lane, Bethesda, MD 20817".into();
        record.account_group = "Montgomery County".into();
        record.agents = vec![
            Agent { name: "Jane Roe".into(), company: "Compass".into() },
            Agent { name: "John Doe".into(), company: "Long & Foster".into() },
        ];
        record
    }

    #[test]
    fn row_follows_fixed_column_order() {
        let row = RowSchema::new(false).row(&sample());
        assert_eq!(row.len(), BASE_COLUMNS.len());
        assert_eq!(row[0], "https://www.compass.com/listing/1");
        assert_eq!(row[1], "$1,250,000");
        assert_eq!(row[2], "12 Oak Lane, Bethesda, MD 20817");
        assert_eq!(row[3], NOT_AVAILABLE);
        assert_eq!(row[7], "Most Expensive Homes in Montgomery County");
        assert_eq!(row[CAPTION_COLUMN], NOT_AVAILABLE);
        assert_eq!(row[9], "Jane Roe; John Doe");
        assert_eq!(row[10], "Compass; Long & Foster");
    }

    #[test]
    fn image_columns_are_padded() {
        let mut record = sample();
        record.image_urls = vec!["a".into(), "b".into()];
        let schema = RowSchema::new(true);
        let row = schema.row(&record);
        assert_eq!(row.len(), schema.width());
        assert_eq!(row[11], "a");
        assert_eq!(row[12], "b");
        assert!(row[13..].iter().all(|c| c.is_empty()));
    }

    #[test]
    fn header_drift_is_detected() {
        let schema = RowSchema::new(false);
        let old: Vec<String> = BASE_COLUMNS[..8].iter().map(|c| c.to_string()).collect();
        assert!(!schema.header_matches(&old));
        assert!(schema.header_matches(&schema.header()));
        assert!(!RowSchema::new(true).header_matches(&schema.header()));
    }
}
