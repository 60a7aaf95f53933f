//! Configuration for the suggestion engine.
//!
//! Every default reproduces the tuned constants the classifier was calibrated
//! with. Heuristic and fusion weights are not configurable.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Text chunking configuration.
    pub chunker: ChunkerConfig,

    /// Intra-document duplicate detection.
    pub duplicates: DuplicateConfig,

    /// Learned-annotation matching.
    pub learned: MatcherConfig,

    /// Structured field extraction.
    pub extraction: ExtractionConfig,
}

impl EngineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON configuration. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Set the chunker configuration.
    pub fn with_chunker(mut self, config: ChunkerConfig) -> Self {
        self.chunker = config;
        self
    }

    /// Set the duplicate detection configuration.
    pub fn with_duplicates(mut self, config: DuplicateConfig) -> Self {
        self.duplicates = config;
        self
    }

    /// Set the learned matcher configuration.
    pub fn with_learned(mut self, config: MatcherConfig) -> Self {
        self.learned = config;
        self
    }

    /// Set the extraction configuration.
    pub fn with_extraction(mut self, config: ExtractionConfig) -> Self {
        self.extraction = config;
        self
    }

    /// Check that every fraction lies in `[0, 1]` and sizes are non-zero.
    pub fn validate(&self) -> Result<()> {
        let fractions = [
            ("learned.min_similarity", self.learned.min_similarity),
            ("learned.accept_threshold", self.learned.accept_threshold),
            ("learned.type_match_boost", self.learned.type_match_boost),
            ("extraction.min_confidence", self.extraction.min_confidence),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.chunker.header_line_max_chars == 0 {
            return Err(EngineError::InvalidConfig(
                "chunker.header_line_max_chars must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the text chunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Longest line (in characters) still treated as an upper-case header.
    pub header_line_max_chars: usize,

    /// Untyped text longer than this is a paragraph rather than unknown.
    pub paragraph_min_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            header_line_max_chars: 80,
            paragraph_min_chars: 200,
        }
    }
}

/// Configuration for intra-document duplicate detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Normalized texts shorter than this never count as duplicates.
    pub min_normalized_chars: usize,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            min_normalized_chars: 50,
        }
    }
}

/// Configuration for matching against the learned corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Candidates below this token-set similarity are skipped.
    pub min_similarity: f32,

    /// Minimum weighted score for a match to be accepted.
    pub accept_threshold: f32,

    /// Added to the similarity when the chunk type equals the learned type.
    pub type_match_boost: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.5,
            accept_threshold: 0.7,
            type_match_boost: 0.10,
        }
    }
}

/// Configuration for structured field extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Whether to extract fields at all.
    pub enabled: bool,

    /// Fields below this confidence are dropped.
    pub min_confidence: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: 0.5,
        }
    }
}
