//! Lexical similarity between chunk texts.

use std::collections::HashSet;

/// Words carrying no signal for matching.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "or", "that", "the", "to", "was", "were", "with",
];

/// Normalize text for matching.
///
/// Lowercases, maps whitespace to a single space, drops every character
/// outside `[a-z0-9 ]`, then collapses runs of spaces and trims.
pub fn normalize_text(text: &str) -> String {
    let filtered: String = text
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some(' ')
            } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
                Some(c)
            } else {
                None
            }
        })
        .collect();

    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split normalized text into its distinct content tokens.
///
/// Stopwords and tokens of two characters or fewer are dropped.
pub fn token_set(normalized: &str) -> HashSet<&str> {
    normalized
        .split_whitespace()
        .filter(|token| token.len() > 2 && !STOPWORDS.contains(token))
        .collect()
}

/// Jaccard similarity `|A ∩ B| / |A ∪ B|` of two token sets.
///
/// Returns 0 when either set is empty.
pub fn jaccard_similarity(a: &HashSet<&str>, b: &HashSet<&str>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}

/// Token-set similarity of two already-normalized texts.
pub fn text_similarity(a: &str, b: &str) -> f32 {
    jaccard_similarity(&token_set(a), &token_set(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_strips_punctuation_and_collapses() {
        assert_eq!(
            normalize_text("  Pt. seen &  examined,\n\tROS (-)!  "),
            "pt seen examined ros"
        );
        assert_eq!(normalize_text("BP: 120/80"), "bp 12080");
        assert_eq!(normalize_text("***"), "");
    }

    #[test]
    fn test_token_set_drops_stopwords_and_short_tokens() {
        let tokens = token_set("the patient is on ng tube with no distress");
        let expected: HashSet<&str> = ["patient", "tube", "distress"].into_iter().collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_identical_sets() {
        let sim = text_similarity("lungs clear bilaterally", "lungs clear bilaterally");
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_partial_overlap() {
        // {lungs, clear, bilaterally} vs {lungs, clear, auscultation}: 2 / 4
        let sim = text_similarity("lungs clear bilaterally", "lungs clear to auscultation");
        assert!((sim - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_sets_have_zero_similarity() {
        assert_eq!(text_similarity("", "lungs clear"), 0.0);
        assert_eq!(text_similarity("a an the", "of to"), 0.0);
    }
}
