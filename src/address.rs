//! Address canonicalization used to recognise the same property across
//! differently formatted address strings.

/// Characters dropped before comparison
const STRIPPED: [char; 7] = [',', '.', '_', '-', '#', '/', ' '];

/// Street-type words and their standard abbreviations
const ABBREVIATIONS: [(&str, &str); 8] = [
    ("road", "rd"),
    ("street", "st"),
    ("avenue", "ave"),
    ("lane", "ln"),
    ("drive", "dr"),
    ("boulevard", "blvd"),
    ("court", "ct"),
    ("place", "pl"),
];

/// Reduce an address to its comparison key.
///
/// Lowercases, removes punctuation and whitespace, then abbreviates street
/// types. Two addresses are the same property exactly when their keys match.
pub fn canonicalize(address: &str) -> String {
    let mut key: String = address
        .to_lowercase()
        .chars()
        .filter(|c| !STRIPPED.contains(c) && !c.is_whitespace())
        .collect();

    // Repeat until stable: an abbreviation can splice a new street word
    // together ("st" + "reet"), and the key must be a fixed point.
    loop {
        let next = ABBREVIATIONS
            .iter()
            .fold(key.clone(), |acc, (word, abbreviation)| {
                acc.replace(word, abbreviation)
            });
        if next == key {
            return key;
        }
        key = next;
    }
}

/// Folder naming used by the first generation of upload tooling:
/// spaces become underscores and commas are dropped.
pub fn underscore_variant(address: &str) -> String {
    address.replace(' ', "_").replace(',', "")
}

/// File-safe prefix for uploaded images, capped at `max_chars` characters
pub fn file_stem(address: &str, max_chars: usize) -> String {
    address
        .replace(' ', "_")
        .replace([',', '#'], "")
        .replace('/', "_")
        .chars()
        .take(max_chars)
        .collect()
}
