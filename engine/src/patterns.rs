//! Compiled pattern sets shared by the rule tables.

use regex_lite::Regex;

/// An immutable set of regexes matched as a disjunction.
///
/// Patterns that fail to compile are skipped, so a bad entry narrows the set
/// instead of panicking at first use.
#[derive(Debug)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    pub fn new(patterns: &[&str]) -> Self {
        let compiled: Vec<Regex> = patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    tracing::warn!("skipping invalid pattern {pattern:?}: {err}");
                    None
                }
            })
            .collect();
        Self { patterns: compiled }
    }

    /// Whether any pattern matches somewhere in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
