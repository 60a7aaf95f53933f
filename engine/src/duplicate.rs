//! Exact duplicate detection within one document.

use std::collections::{HashMap, HashSet};

use crate::chunker::Chunk;

/// Lowercase and trim, the normalization used for duplicate grouping.
pub fn normalize_for_duplicates(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Return the ids of every chunk whose normalized text appears in at least
/// one other chunk of the same document.
///
/// Normalized texts shorter than `min_chars` characters are ignored.
pub fn find_duplicates(chunks: &[Chunk], min_chars: usize) -> HashSet<String> {
    let mut groups: HashMap<String, Vec<&str>> = HashMap::new();
    for chunk in chunks {
        let normalized = normalize_for_duplicates(&chunk.text);
        if normalized.chars().count() < min_chars {
            continue;
        }
        groups.entry(normalized).or_default().push(chunk.id.as_str());
    }

    groups
        .into_values()
        .filter(|ids| ids.len() >= 2)
        .flatten()
        .map(str::to_string)
        .collect()
}
