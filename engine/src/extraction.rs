//! Structured field extraction from chunks using pattern matching.
//!
//! Pulls vital signs, lab values, medications, allergies, code status and
//! dates out of chunk text. Extraction is purely additive: it never feeds
//! back into label decisions.

use std::collections::HashMap;
use std::sync::LazyLock;

use indexmap::IndexMap;
use indexmap::map::Entry;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chunker::{Chunk, ChunkType};
use crate::config::ExtractionConfig;

/// Extracted confidence never exceeds this.
const MAX_FIELD_CONFIDENCE: f32 = 0.99;

/// Bonus when a field is found in a chunk of its own kind.
const TYPE_MATCH_BONUS: f32 = 0.05;

/// Words that look like a drug name in front of a dose but are not.
const NON_DRUG_WORDS: &[&str] = &[
    "and", "dose", "doses", "give", "given", "increase", "increased", "decrease", "decreased",
    "taking", "take", "then", "total", "with", "was", "the", "for",
];

/// A structured fact pulled from a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    /// Unique identifier.
    pub id: String,

    pub category: FieldCategory,

    /// What was measured or named, e.g. `HR` or `warfarin`.
    pub label: String,

    /// The value as written.
    pub value: String,

    /// Confidence score (0.0 to 1.0).
    pub confidence: f32,

    /// Chunk the field was found in.
    pub source_chunk_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl ExtractedField {
    pub fn new(
        category: FieldCategory,
        label: impl Into<String>,
        value: impl Into<String>,
        confidence: f32,
        source_chunk_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            label: label.into(),
            value: value.into(),
            confidence,
            source_chunk_id: source_chunk_id.into(),
            metadata: None,
        }
    }

    /// Set a metadata entry.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
    }

    /// Key under which fields are deduplicated across a document.
    pub fn dedup_key(&self) -> (FieldCategory, String, String) {
        (self.category, normalize(&self.label), normalize(&self.value))
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Kind of extracted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    VitalSign,
    LabValue,
    Medication,
    Allergy,
    CodeStatus,
    Date,
}

impl FieldCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VitalSign => "vital_sign",
            Self::LabValue => "lab_value",
            Self::Medication => "medication",
            Self::Allergy => "allergy",
            Self::CodeStatus => "code_status",
            Self::Date => "date",
        }
    }

    /// Confidence before the chunk-type bonus.
    pub fn base_confidence(&self) -> f32 {
        match self {
            Self::VitalSign => 0.90,
            Self::LabValue => 0.85,
            Self::Medication => 0.80,
            Self::Allergy => 0.75,
            Self::CodeStatus => 0.90,
            Self::Date => 0.95,
        }
    }

    /// Whether `chunk_type` is the natural home of this category.
    pub fn matches_chunk_type(&self, chunk_type: ChunkType) -> bool {
        matches!(
            (self, chunk_type),
            (Self::VitalSign, ChunkType::VitalSigns)
                | (Self::LabValue, ChunkType::LabValues)
                | (Self::Medication, ChunkType::MedicationList)
        )
    }
}

fn compile_labeled(patterns: &[(&'static str, &str)]) -> Vec<(&'static str, Regex)> {
    patterns
        .iter()
        .filter_map(|(label, pattern)| match Regex::new(pattern) {
            Ok(re) => Some((*label, re)),
            Err(err) => {
                warn!("Skipping invalid {label} pattern: {err}");
                None
            }
        })
        .collect()
}

static VITAL_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    compile_labeled(&[
        (
            "BP",
            r"(?i)\b(?:bp|blood pressure)\s*:?\s*(\d{2,3}\s*/\s*\d{2,3})",
        ),
        ("HR", r"(?i)\b(?:hr|heart rate|pulse)\s*:?\s*(\d{2,3})\b"),
        ("RR", r"(?i)\b(?:rr|resp(?:iratory)? rate)\s*:?\s*(\d{1,2})\b"),
        (
            "Temp",
            r"(?i)\b(?:temperature|tmax|temp|t)\s*:?\s*(\d{2,3}\.\d)",
        ),
        (
            "SpO2",
            r"(?i)\b(?:spo2|o2 sat|sat(?:uration)?)\s*:?\s*(\d{2,3})\s*%",
        ),
    ])
});

static LAB_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    const NUMBER: &str = r"\b\s*:?\s*(\d+(?:\.\d+)?)";
    let table: &[(&'static str, &str)] = &[
        ("WBC", "wbc"),
        ("Hgb", "hgb|hemoglobin|hb"),
        ("Hct", "hct|hematocrit"),
        ("Plt", "plt|platelets?"),
        ("Na", "na|sodium"),
        ("K", "k|potassium"),
        ("Cl", "cl|chloride"),
        ("CO2", "co2|hco3|bicarb(?:onate)?"),
        ("BUN", "bun"),
        ("Cr", "cr|creat(?:inine)?"),
        ("Glucose", "glucose|glu"),
        ("AST", "ast"),
        ("ALT", "alt"),
        ("Bili", r"t\.?\s?bili|bili(?:rubin)?"),
        ("INR", "inr"),
        ("Lactate", "lactate|lactic acid"),
        ("Troponin", "trop(?:onin)?(?:\\s*[it])?"),
    ];
    let patterns: Vec<(&'static str, String)> = table
        .iter()
        .map(|(label, aliases)| (*label, format!(r"(?i)\b(?:{aliases}){NUMBER}")))
        .collect();
    let borrowed: Vec<(&'static str, &str)> = patterns
        .iter()
        .map(|(label, pattern)| (*label, pattern.as_str()))
        .collect();
    compile_labeled(&borrowed)
});

static MEDICATION_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile_one(
        r"(?i)\b([a-z][a-z\-]{2,})\s+(\d+(?:\.\d+)?\s*(?:mg/kg|mcg|mg|meq|ml|units?|g))\b(?:\s+(daily|bid|tid|qid|qhs|qd|q\d+h|prn|weekly|once))?",
    )
});

static ALLERGY_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    compile_labeled(&[
        ("none", r"(?i)\b(nkda|no known (?:drug )?allergies)\b"),
        (
            "allergen",
            r"(?i)\ballerg(?:y|ies|ic)\s*(?:to)?\s*:?\s*([a-z][a-z0-9 ,/\-]{1,80})",
        ),
    ])
});

static CODE_STATUS_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile_one(
        r"(?i)\b(full code|dnr/dni|dnr|dni|do not resuscitate|do not intubate|comfort measures only|comfort care|cmo)\b",
    )
});

static DATE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    compile_labeled(&[
        ("iso", r"\b(\d{4}-\d{2}-\d{2})\b"),
        ("us", r"\b(\d{1,2}/\d{1,2}/\d{2,4})\b"),
    ])
});

fn compile_one(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            warn!("Skipping invalid pattern: {err}");
            None
        }
    }
}

/// Field extractor using pattern matching.
pub struct FieldExtractor {
    config: ExtractionConfig,
}

impl FieldExtractor {
    /// Create a new extractor with default configuration.
    pub fn new() -> Self {
        Self::with_config(ExtractionConfig::default())
    }

    /// Create an extractor with custom configuration.
    pub fn with_config(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract fields from every chunk of a document.
    ///
    /// Fields sharing `(category, label, value)` after normalization are
    /// collapsed to the most confident instance, earliest on ties. Output
    /// follows first appearance.
    pub fn extract(&self, chunks: &[Chunk]) -> Vec<ExtractedField> {
        if !self.config.enabled {
            return Vec::new();
        }

        let mut fields: IndexMap<(FieldCategory, String, String), ExtractedField> =
            IndexMap::new();
        for chunk in chunks {
            for field in self.extract_from_chunk(chunk) {
                match fields.entry(field.dedup_key()) {
                    Entry::Occupied(mut existing) => {
                        if field.confidence > existing.get().confidence {
                            existing.insert(field);
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(field);
                    }
                }
            }
        }

        debug!("Extracted {} fields from {} chunks", fields.len(), chunks.len());
        fields.into_values().collect()
    }

    /// Extract fields from a single chunk, before deduplication.
    pub fn extract_from_chunk(&self, chunk: &Chunk) -> Vec<ExtractedField> {
        let text = &chunk.text;
        let mut fields = Vec::new();

        fields.extend(self.extract_labeled(chunk, FieldCategory::VitalSign, &VITAL_PATTERNS));
        fields.extend(self.extract_labeled(chunk, FieldCategory::LabValue, &LAB_PATTERNS));
        fields.extend(self.extract_medications(chunk));
        fields.extend(self.extract_allergies(chunk));
        fields.extend(self.extract_code_status(chunk));
        fields.extend(self.extract_dates(chunk));

        fields.retain(|f| f.confidence >= self.config.min_confidence);
        if !fields.is_empty() {
            debug!("Chunk {} yielded {} fields ({} chars)", chunk.id, fields.len(), text.len());
        }
        fields
    }

    fn confidence_for(&self, category: FieldCategory, chunk: &Chunk) -> f32 {
        let bonus = if category.matches_chunk_type(chunk.chunk_type) {
            TYPE_MATCH_BONUS
        } else {
            0.0
        };
        (category.base_confidence() + bonus).min(MAX_FIELD_CONFIDENCE)
    }

    fn extract_labeled(
        &self,
        chunk: &Chunk,
        category: FieldCategory,
        patterns: &[(&'static str, Regex)],
    ) -> Vec<ExtractedField> {
        let confidence = self.confidence_for(category, chunk);
        let mut fields = Vec::new();
        for (label, re) in patterns {
            for cap in re.captures_iter(&chunk.text) {
                if let Some(value) = cap.get(1) {
                    let value = value.as_str().split_whitespace().collect::<String>();
                    fields.push(ExtractedField::new(
                        category, *label, value, confidence, &chunk.id,
                    ));
                }
            }
        }
        fields
    }

    fn extract_medications(&self, chunk: &Chunk) -> Vec<ExtractedField> {
        let Some(re) = MEDICATION_PATTERN.as_ref() else {
            return Vec::new();
        };
        let confidence = self.confidence_for(FieldCategory::Medication, chunk);
        let mut fields = Vec::new();

        for cap in re.captures_iter(&chunk.text) {
            let (Some(name), Some(dose)) = (cap.get(1), cap.get(2)) else {
                continue;
            };
            let name = name.as_str().to_lowercase();
            if NON_DRUG_WORDS.contains(&name.as_str()) {
                continue;
            }

            let mut field = ExtractedField::new(
                FieldCategory::Medication,
                name,
                dose.as_str(),
                confidence,
                &chunk.id,
            );
            if let Some(frequency) = cap.get(3) {
                field.set_metadata("frequency", frequency.as_str().to_lowercase());
            }
            fields.push(field);
        }
        fields
    }

    fn extract_allergies(&self, chunk: &Chunk) -> Vec<ExtractedField> {
        let confidence = self.confidence_for(FieldCategory::Allergy, chunk);
        let mut fields = Vec::new();

        for (kind, re) in ALLERGY_PATTERNS.iter() {
            for cap in re.captures_iter(&chunk.text) {
                let Some(value) = cap.get(1) else {
                    continue;
                };
                let value = if *kind == "none" {
                    "NKDA"
                } else {
                    value
                        .as_str()
                        .trim()
                        .trim_end_matches([',', '/', '-'])
                        .trim()
                };
                if value.is_empty() {
                    continue;
                }
                fields.push(ExtractedField::new(
                    FieldCategory::Allergy,
                    "allergy",
                    value,
                    confidence,
                    &chunk.id,
                ));
            }
        }
        fields
    }

    fn extract_code_status(&self, chunk: &Chunk) -> Vec<ExtractedField> {
        let Some(re) = CODE_STATUS_PATTERN.as_ref() else {
            return Vec::new();
        };
        let confidence = self.confidence_for(FieldCategory::CodeStatus, chunk);
        re.captures_iter(&chunk.text)
            .filter_map(|cap| cap.get(1))
            .map(|status| {
                ExtractedField::new(
                    FieldCategory::CodeStatus,
                    "code_status",
                    status.as_str().to_uppercase(),
                    confidence,
                    &chunk.id,
                )
            })
            .collect()
    }

    fn extract_dates(&self, chunk: &Chunk) -> Vec<ExtractedField> {
        let confidence = self.confidence_for(FieldCategory::Date, chunk);
        let mut fields = Vec::new();
        for (format, re) in DATE_PATTERNS.iter() {
            for cap in re.captures_iter(&chunk.text) {
                if let Some(date) = cap.get(1) {
                    let mut field = ExtractedField::new(
                        FieldCategory::Date,
                        "date",
                        date.as_str(),
                        confidence,
                        &chunk.id,
                    );
                    field.set_metadata("format", *format);
                    fields.push(field);
                }
            }
        }
        fields
    }
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new()
    }
}
