//! Structural chunking of clinical note text.
//!
//! The note is first cut into sections at lines that look like upper-case
//! section headers, then each section is split on blank lines. Every chunk
//! keeps the exact byte span it was cut from, so `text[start..end]` of the
//! source equals the chunk text and the gaps between chunks are the original
//! separators.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ChunkerConfig, DuplicateConfig};
use crate::critical::{CriticalCategory, detect_critical};
use crate::duplicate::find_duplicates;
use crate::label::{CondenseStrategy, Label, RemoveReason};
use crate::patterns::PatternSet;

/// A contiguous, offset-addressed fragment of a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Identifier, unique within the document.
    pub id: String,

    /// The chunk text, trimmed of surrounding whitespace.
    pub text: String,

    /// Structural type of the chunk.
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,

    /// Byte offset of the first character in the source text.
    pub start_offset: usize,

    /// Byte offset one past the last character in the source text.
    pub end_offset: usize,

    /// Whether the chunk carries safety-critical content.
    pub is_critical: bool,

    /// First critical category matched, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_category: Option<CriticalCategory>,

    /// Weak label suggestion from the parser rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Suggestion>,
}

impl Chunk {
    /// Create a chunk with no critical flag and no suggestion.
    pub fn new(id: impl Into<String>, text: impl Into<String>, chunk_type: ChunkType) -> Self {
        let text = text.into();
        let end_offset = text.len();
        Self {
            id: id.into(),
            text,
            chunk_type,
            start_offset: 0,
            end_offset,
            is_critical: false,
            critical_category: None,
            suggestion: None,
        }
    }

    /// Set the offsets.
    pub fn with_offsets(mut self, start: usize, end: usize) -> Self {
        self.start_offset = start;
        self.end_offset = end;
        self
    }

    /// Mark the chunk critical under `category`.
    pub fn with_critical(mut self, category: CriticalCategory) -> Self {
        self.is_critical = true;
        self.critical_category = Some(category);
        self
    }

    /// Set the parser suggestion.
    pub fn with_suggestion(mut self, suggestion: Suggestion) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn suggested_label(&self) -> Option<Label> {
        self.suggestion.as_ref().map(|s| s.label)
    }

    /// Parser suggestion confidence, 0 when there is none.
    pub fn suggested_confidence(&self) -> f32 {
        self.suggestion.as_ref().map_or(0.0, |s| s.confidence)
    }
}

/// Structural type of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    SectionHeader,
    Paragraph,
    BulletList,
    ImagingReport,
    LabValues,
    MedicationList,
    VitalSigns,
    Attestation,
    Unknown,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SectionHeader => "section_header",
            Self::Paragraph => "paragraph",
            Self::BulletList => "bullet_list",
            Self::ImagingReport => "imaging_report",
            Self::LabValues => "lab_values",
            Self::MedicationList => "medication_list",
            Self::VitalSigns => "vital_signs",
            Self::Attestation => "attestation",
            Self::Unknown => "unknown",
        }
    }
}

/// A weak label suggestion attached to a chunk by the parser rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub label: Label,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_reason: Option<RemoveReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condense_strategy: Option<CondenseStrategy>,
}

impl Suggestion {
    pub fn keep(confidence: f32) -> Self {
        Self {
            label: Label::Keep,
            confidence,
            remove_reason: None,
            condense_strategy: None,
        }
    }

    pub fn remove(confidence: f32, reason: RemoveReason) -> Self {
        Self {
            label: Label::Remove,
            confidence,
            remove_reason: Some(reason),
            condense_strategy: None,
        }
    }

    pub fn condense(confidence: f32, strategy: CondenseStrategy) -> Self {
        Self {
            label: Label::Condense,
            confidence,
            remove_reason: None,
            condense_strategy: Some(strategy),
        }
    }
}

/// Known section-header keywords, upper-case.
const SECTION_HEADERS: &[&str] = &[
    "CHIEF COMPLAINT",
    "CC",
    "HISTORY OF PRESENT ILLNESS",
    "HPI",
    "INTERVAL HISTORY",
    "PAST MEDICAL HISTORY",
    "PMH",
    "PAST SURGICAL HISTORY",
    "PSH",
    "SOCIAL HISTORY",
    "FAMILY HISTORY",
    "REVIEW OF SYSTEMS",
    "ROS",
    "PHYSICAL EXAM",
    "PHYSICAL EXAMINATION",
    "EXAM",
    "VITALS",
    "VITAL SIGNS",
    "MEDICATIONS",
    "HOME MEDICATIONS",
    "CURRENT MEDICATIONS",
    "ALLERGIES",
    "LABS",
    "LABORATORY",
    "LABORATORY DATA",
    "IMAGING",
    "RADIOLOGY",
    "STUDIES",
    "ASSESSMENT AND PLAN",
    "ASSESSMENT & PLAN",
    "ASSESSMENT/PLAN",
    "ASSESSMENT",
    "PLAN",
    "A/P",
    "IMPRESSION AND PLAN",
    "HOSPITAL COURSE",
    "PROBLEM LIST",
    "DIAGNOSES",
    "DISPOSITION",
    "DISCHARGE INSTRUCTIONS",
    "SUBJECTIVE",
    "OBJECTIVE",
    "CODE STATUS",
];

static IMAGING: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"(?i)\b(ct|cta|mri|mra|cxr|x-?rays?|ultrasound|echo|echocardiogram|ekg|ecg)\b",
        r"(?i)\b(impression|findings)\b",
    ])
});

static LAB_TOKENS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"\b(WBC|Hgb|HGB|Hct|HCT|Plt|PLT|Na|NA|K|Cr|CR|BUN|AST|ALT)\b",
        r"(?i)\b(glucose|bili|bilirubin|t\.? ?bili)\b",
    ])
});

static VITAL_TOKENS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"\b(BP|HR|RR)\b",
        r"(?i)\b(spo2|o2 sat|temp|tmax|temperature)\b",
    ])
});

static MEDICATION_TOKENS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"(?i)\d\s*(mg|mcg|units?)\b",
        r"(?i)\b(mg|mcg|units?|tablets?|capsules?|daily|bid|tid|qid|prn|qhs)\b",
    ])
});

static ATTESTATION: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"(?i)i have personally seen and examined (the |this )?patient",
        r"(?i)electronically signed by",
        r"(?i)\bco-?signed by\b",
        r"(?i)\bi attest\b",
        r"(?i)\battestation\b",
        r"(?i)teaching physician",
        r"(?i)agree with (the )?(resident|fellow|np|pa)('s)? (note|findings|assessment|plan)",
    ])
});

static BOILERPLATE: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"(?i)dictated (but|and) not (read|reviewed)",
        r"(?i)voice recognition",
        r"(?i)please excuse (any )?(typographical|transcription) errors",
        r"(?i)this (note|document) (was|has been) (generated|created|prepared)",
        r"(?i)total time spent",
        r"(?i)more than 50% of (the )?(visit|time)",
        r"(?i)for billing purposes",
    ])
});

/// Pre-computed views of a chunk's text shared by the type rules.
struct TypeProbe<'a> {
    text: &'a str,
    upper: String,
    has_digit: bool,
}

type TypeRule = (ChunkType, fn(&TypeProbe<'_>) -> bool);

/// Type detection table. The first matching rule wins; text that matches
/// nothing falls back to paragraph or unknown by length.
const TYPE_RULES: &[TypeRule] = &[
    (ChunkType::SectionHeader, is_section_header),
    (ChunkType::BulletList, is_bullet_list),
    (ChunkType::ImagingReport, is_imaging_report),
    (ChunkType::LabValues, is_lab_values),
    (ChunkType::VitalSigns, is_vital_signs),
    (ChunkType::MedicationList, is_medication_list),
    (ChunkType::Attestation, is_attestation),
];

fn is_section_header(probe: &TypeProbe<'_>) -> bool {
    starts_with_section_keyword(&probe.upper)
}

fn is_bullet_list(probe: &TypeProbe<'_>) -> bool {
    starts_with_bullet(probe.text)
}

fn is_imaging_report(probe: &TypeProbe<'_>) -> bool {
    IMAGING.is_match(probe.text)
}

fn is_lab_values(probe: &TypeProbe<'_>) -> bool {
    probe.has_digit && LAB_TOKENS.is_match(probe.text)
}

fn is_vital_signs(probe: &TypeProbe<'_>) -> bool {
    probe.has_digit && VITAL_TOKENS.is_match(probe.text)
}

fn is_medication_list(probe: &TypeProbe<'_>) -> bool {
    MEDICATION_TOKENS.is_match(probe.text)
}

fn is_attestation(probe: &TypeProbe<'_>) -> bool {
    ATTESTATION.is_match(probe.text) || BOILERPLATE.is_match(probe.text)
}

/// `upper` starts with a header keyword followed by a non-alphanumeric
/// character or the end of the text.
fn starts_with_section_keyword(upper: &str) -> bool {
    SECTION_HEADERS.iter().any(|keyword| {
        upper.strip_prefix(keyword).is_some_and(|rest| {
            rest.chars()
                .next()
                .is_none_or(|c| !c.is_alphanumeric())
        })
    })
}

fn starts_with_bullet(text: &str) -> bool {
    if text.starts_with(['-', '•', '*']) {
        return true;
    }
    let digits = text.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return false;
    }
    // Digits are single-byte, so `digits` is a valid byte index.
    text[digits..]
        .strip_prefix('.')
        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
}

/// Boilerplate language outside a formal attestation.
fn is_boilerplate(text: &str) -> bool {
    BOILERPLATE.is_match(text)
}

/// Splits note text into typed chunks.
pub struct TextChunker {
    config: ChunkerConfig,
    duplicates: DuplicateConfig,
}

impl TextChunker {
    /// Create a chunker with default configuration.
    pub fn new() -> Self {
        Self {
            config: ChunkerConfig::default(),
            duplicates: DuplicateConfig::default(),
        }
    }

    /// Create a chunker with custom configuration.
    pub fn with_config(config: ChunkerConfig, duplicates: DuplicateConfig) -> Self {
        Self { config, duplicates }
    }

    /// Chunk a whole note.
    ///
    /// Returns an empty list for empty or whitespace-only text.
    pub fn chunk_document(&self, text: &str) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = self
            .split_spans(text)
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| self.build_chunk(index, &text[start..end], start, end))
            .collect();

        // Repeated passages override whatever the parser rules suggested.
        let duplicate_ids = find_duplicates(&chunks, self.duplicates.min_normalized_chars);
        for chunk in chunks.iter_mut().filter(|c| duplicate_ids.contains(&c.id)) {
            chunk.suggestion = Some(Suggestion::remove(0.75, RemoveReason::DuplicateData));
        }

        debug!(
            "Created {} chunks ({} duplicates)",
            chunks.len(),
            duplicate_ids.len()
        );
        chunks
    }

    /// Detect the structural type of a trimmed chunk text.
    pub fn detect_type(&self, text: &str) -> ChunkType {
        let probe = TypeProbe {
            text,
            upper: text.trim().to_uppercase(),
            has_digit: text.chars().any(|c| c.is_ascii_digit()),
        };

        TYPE_RULES
            .iter()
            .find(|(_, applies)| applies(&probe))
            .map(|(chunk_type, _)| *chunk_type)
            .unwrap_or_else(|| {
                if text.chars().count() > self.config.paragraph_min_chars {
                    ChunkType::Paragraph
                } else {
                    ChunkType::Unknown
                }
            })
    }

    /// Whether a single line should start its own header chunk.
    pub fn looks_like_header_line(&self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.chars().count() > self.config.header_line_max_chars {
            return false;
        }

        let bare = trimmed.trim_end_matches(':').trim_end().to_uppercase();
        if SECTION_HEADERS.contains(&bare.as_str()) {
            return true;
        }

        if trimmed.chars().any(|c| c.is_ascii_digit()) || starts_with_bullet(trimmed) {
            return false;
        }
        let mut letters = trimmed.chars().filter(|c| c.is_alphabetic()).peekable();
        if letters.peek().is_none() {
            return false;
        }
        let mut count = 0;
        for c in letters {
            if c.is_lowercase() {
                return false;
            }
            count += 1;
        }
        count >= 2
    }

    fn build_chunk(&self, index: usize, text: &str, start: usize, end: usize) -> Chunk {
        let chunk_type = self.detect_type(text);
        let mut chunk = Chunk::new(format!("chunk-{index}"), text, chunk_type).with_offsets(start, end);
        if let Some(category) = detect_critical(text) {
            chunk = chunk.with_critical(category);
        }
        chunk.suggestion = self.initial_suggestion(&chunk);
        chunk
    }

    fn initial_suggestion(&self, chunk: &Chunk) -> Option<Suggestion> {
        match chunk.chunk_type {
            ChunkType::Attestation => {
                Some(Suggestion::remove(0.85, RemoveReason::BillingAttestation))
            }
            _ if is_boilerplate(&chunk.text) => {
                Some(Suggestion::remove(0.80, RemoveReason::AdministrativeText))
            }
            ChunkType::SectionHeader => Some(Suggestion::keep(0.90)),
            ChunkType::LabValues if chunk.char_len() > 300 => {
                Some(Suggestion::condense(0.60, CondenseStrategy::AbnormalOnly))
            }
            _ => None,
        }
    }

    /// Compute the trimmed byte spans of every chunk in `text`.
    fn split_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        for section in self.parse_sections(text) {
            if section.is_header {
                spans.extend(trim_span(text, section.start, section.end));
            } else {
                split_on_blank_lines(text, section.start, section.end, &mut spans);
            }
        }
        spans
    }

    /// Cut the note into sections at header-looking lines.
    fn parse_sections(&self, text: &str) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut section_start = 0;

        for (line_start, line) in lines_with_offsets(text) {
            if !self.looks_like_header_line(line) {
                continue;
            }
            if line_start > section_start {
                sections.push(Section::body(section_start, line_start));
            }
            let line_end = line_start + line.len();
            sections.push(Section::header(line_start, line_end));
            section_start = line_end;
        }

        if section_start < text.len() {
            sections.push(Section::body(section_start, text.len()));
        }
        sections
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Chunk a note with the default configuration.
pub fn chunk_document(text: &str) -> Vec<Chunk> {
    TextChunker::new().chunk_document(text)
}

/// A header line or the body between two header lines.
struct Section {
    start: usize,
    end: usize,
    is_header: bool,
}

impl Section {
    fn header(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            is_header: true,
        }
    }

    fn body(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            is_header: false,
        }
    }
}

/// Iterate the lines of `text` (without terminators) with their byte offsets.
fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_inclusive('\n').scan(0, |offset, raw| {
        let start = *offset;
        *offset += raw.len();
        Some((start, raw.trim_end_matches(['\n', '\r'])))
    })
}

/// Split `text[start..end]` on blank-line runs, pushing trimmed spans.
fn split_on_blank_lines(text: &str, start: usize, end: usize, spans: &mut Vec<(usize, usize)>) {
    let mut block: Option<(usize, usize)> = None;

    for (relative, line) in lines_with_offsets(&text[start..end]) {
        let line_start = start + relative;
        if line.trim().is_empty() {
            if let Some((block_start, block_end)) = block.take() {
                spans.extend(trim_span(text, block_start, block_end));
            }
            continue;
        }
        let line_end = line_start + line.len();
        block = Some(match block {
            Some((block_start, _)) => (block_start, line_end),
            None => (line_start, line_end),
        });
    }

    if let Some((block_start, block_end)) = block {
        spans.extend(trim_span(text, block_start, block_end));
    }
}

/// Shrink a span to exclude surrounding whitespace; `None` if nothing is left.
fn trim_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let leading = slice.len() - slice.trim_start().len();
    let new_start = start + leading;
    Some((new_start, new_start + trimmed.len()))
}
