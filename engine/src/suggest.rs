//! Per-document suggestion orchestration.
//!
//! This module provides the main entry point: chunk a note, then decide a
//! label for every chunk from learned annotations, duplicate detection and
//! heuristic signals, in that priority order.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunker::{Chunk, TextChunker};
use crate::config::EngineConfig;
use crate::duplicate::find_duplicates;
use crate::extraction::{ExtractedField, FieldExtractor};
use crate::fusion::{self, Decision};
use crate::heuristic;
use crate::label::{Annotation, ExplanationSource, Label, ModelExplanation, RemoveReason, Scope};
use crate::learned::{DocumentContext, LearnedAnnotation, LearnedRuleMatcher};

/// Confidence of a duplicate-data removal.
const DUPLICATE_CONFIDENCE: f32 = 0.74;

/// Suggestions for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSuggestions {
    /// Final annotation per chunk id, in chunk order. Unlabeled chunks are absent.
    pub annotations: IndexMap<String, Annotation>,

    /// Explanation per annotated chunk id.
    pub explanations: IndexMap<String, ModelExplanation>,

    /// Structured fields, deduplicated across the document.
    pub extracted_fields: Vec<ExtractedField>,

    pub stats: SuggestionStats,
}

impl DocumentSuggestions {
    pub fn label_of(&self, chunk_id: &str) -> Option<Label> {
        self.annotations.get(chunk_id).map(|a| a.label)
    }

    fn insert(&mut self, decision: Decision) {
        let chunk_id = decision.annotation.chunk_id.clone();
        self.explanations.insert(chunk_id.clone(), decision.explanation);
        self.annotations.insert(chunk_id, decision.annotation);
    }
}

/// Statistics about one classification run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionStats {
    pub total_chunks: usize,
    pub annotated_chunks: usize,
    pub keep: usize,
    pub condense: usize,
    pub remove: usize,
    pub critical_chunks: usize,
    pub duplicate_chunks: usize,
    pub learned_matches: usize,
    pub safety_overrides: usize,
    pub extracted_fields: usize,
}

impl SuggestionStats {
    fn record(&mut self, decision: &Decision) {
        self.annotated_chunks += 1;
        match decision.annotation.label {
            Label::Keep => self.keep += 1,
            Label::Condense => self.condense += 1,
            Label::Remove => self.remove += 1,
        }
        match decision.explanation.source {
            ExplanationSource::LearnedExact | ExplanationSource::LearnedSimilar => {
                self.learned_matches += 1
            }
            ExplanationSource::CriticalSafety => self.safety_overrides += 1,
            _ => {}
        }
    }
}

/// Chunking and classification engine.
pub struct SuggestionEngine {
    config: EngineConfig,
    chunker: TextChunker,
    matcher: LearnedRuleMatcher,
    extractor: FieldExtractor,
}

impl SuggestionEngine {
    /// Create an engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with custom configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            chunker: TextChunker::with_config(config.chunker.clone(), config.duplicates.clone()),
            matcher: LearnedRuleMatcher::with_config(config.learned.clone()),
            extractor: FieldExtractor::with_config(config.extraction.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Split note text into typed chunks.
    pub fn chunk_document(&self, text: &str) -> Vec<Chunk> {
        self.chunker.chunk_document(text)
    }

    /// Decide a label for every chunk of one document.
    ///
    /// `corpus` holds previously confirmed annotations; it is read, never
    /// modified, and nothing is retained between calls.
    pub fn classify_document(
        &self,
        chunks: &[Chunk],
        corpus: &[LearnedAnnotation],
        context: &DocumentContext,
    ) -> DocumentSuggestions {
        let duplicates = find_duplicates(chunks, self.config.duplicates.min_normalized_chars);
        let mut suggestions = DocumentSuggestions::default();
        let mut stats = SuggestionStats {
            total_chunks: chunks.len(),
            duplicate_chunks: duplicates.len(),
            critical_chunks: chunks.iter().filter(|c| c.is_critical).count(),
            ..SuggestionStats::default()
        };

        for chunk in chunks {
            match self.suggest_chunk(chunk, corpus, context, &duplicates) {
                Some(decision) => {
                    stats.record(&decision);
                    suggestions.insert(decision);
                }
                None => debug!("Chunk {} left unlabeled", chunk.id),
            }
        }

        suggestions.extracted_fields = self.extractor.extract(chunks);
        stats.extracted_fields = suggestions.extracted_fields.len();

        info!(
            "Classified {} chunks: {} keep, {} condense, {} remove, {} unlabeled ({} learned, {} safety overrides)",
            stats.total_chunks,
            stats.keep,
            stats.condense,
            stats.remove,
            stats.total_chunks - stats.annotated_chunks,
            stats.learned_matches,
            stats.safety_overrides
        );

        suggestions.stats = stats;
        suggestions
    }

    /// Chunk and classify a note in one step.
    pub fn process_note(
        &self,
        text: &str,
        corpus: &[LearnedAnnotation],
        context: &DocumentContext,
    ) -> (Vec<Chunk>, DocumentSuggestions) {
        let chunks = self.chunk_document(text);
        let suggestions = self.classify_document(&chunks, corpus, context);
        (chunks, suggestions)
    }

    /// Decide a label for one chunk given the document's duplicate set.
    pub fn suggest_chunk(
        &self,
        chunk: &Chunk,
        corpus: &[LearnedAnnotation],
        context: &DocumentContext,
        duplicates: &HashSet<String>,
    ) -> Option<Decision> {
        // Step 1: human-confirmed annotations outrank everything else
        if let Some(matched) = self.matcher.best_match(chunk, corpus, context) {
            debug!(
                "Chunk {} matched learned entry {} (score {:.3})",
                chunk.id, matched.index, matched.score
            );
            let (annotation, explanation) = matched.into_suggestion(&chunk.id);
            return Some(guarded(chunk, Decision::new(annotation, explanation)));
        }

        // Step 2: repeated passages
        if duplicates.contains(&chunk.id) {
            let annotation =
                Annotation::suggested(chunk.id.clone(), Label::Remove, DUPLICATE_CONFIDENCE)
                    .with_remove_reason(Some(RemoveReason::DuplicateData))
                    .with_scope(Scope::ThisDocument);
            let explanation = ModelExplanation::new(
                ExplanationSource::DuplicateDetector,
                DUPLICATE_CONFIDENCE,
                "text repeats elsewhere in this document",
            )
            .with_signals(vec![format!("duplicate_set_size:{}", duplicates.len())]);
            return Some(guarded(chunk, Decision::new(annotation, explanation)));
        }

        // Step 3: heuristic rules fused with the parser suggestion
        let signals = fusion::collect_signals(chunk, heuristic::classify(chunk));
        fusion::fuse(chunk, &signals)
    }
}

/// Apply the critical-content override to a decision made outside fusion.
fn guarded(chunk: &Chunk, mut decision: Decision) -> Decision {
    decision.enforce_safety(chunk);
    decision
}

impl Default for SuggestionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify a document with the default configuration.
pub fn classify_document(
    chunks: &[Chunk],
    corpus: &[LearnedAnnotation],
    context: &DocumentContext,
) -> DocumentSuggestions {
    SuggestionEngine::new().classify_document(chunks, corpus, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkType;
    use crate::critical::CriticalCategory;
    use crate::label::CondenseStrategy;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn learned(text: &str, label: Label, scope: Scope) -> LearnedAnnotation {
        LearnedAnnotation {
            chunk_id: "prior-1".to_string(),
            raw_text: text.to_string(),
            section_type: ChunkType::Paragraph,
            label,
            remove_reason: None,
            condense_strategy: None,
            scope,
            timestamp: Utc::now(),
            user_id: "reviewer".to_string(),
        }
    }

    #[test]
    fn test_learned_match_outranks_duplicate() {
        let text = "Patient tolerating regular diet, ambulating independently in the hallway today.";
        let chunks = vec![
            Chunk::new("chunk-0", text, ChunkType::Paragraph),
            Chunk::new("chunk-1", text, ChunkType::Paragraph),
        ];
        // {patient, tolerating, regular, diet, ambulating, independently, hallway, today}
        // vs the same minus {hallway, today}: 6 / 8 = 0.75, boosted to 0.85, x0.95.
        let corpus = vec![learned(
            "Patient tolerating regular diet, ambulating independently",
            Label::Keep,
            Scope::NoteType,
        )];
        let context = DocumentContext::new().with_note_type("progress");

        let result = SuggestionEngine::new().classify_document(&chunks, &corpus, &context);
        for id in ["chunk-0", "chunk-1"] {
            assert_eq!(result.label_of(id), Some(Label::Keep));
            assert_eq!(
                result.explanations[id].source,
                ExplanationSource::LearnedSimilar
            );
            assert!((result.annotations[id].confidence - 0.8075).abs() < 1e-4);
        }
        assert_eq!(result.stats.learned_matches, 2);
        assert_eq!(result.stats.duplicate_chunks, 2);
    }

    #[test]
    fn test_duplicate_removal() {
        let text = "x".repeat(80);
        let chunks = vec![
            Chunk::new("chunk-0", text.clone(), ChunkType::Unknown),
            Chunk::new("chunk-1", text, ChunkType::Unknown),
        ];
        let result = classify_document(&chunks, &[], &DocumentContext::new());
        for id in ["chunk-0", "chunk-1"] {
            let annotation = &result.annotations[id];
            assert_eq!(annotation.label, Label::Remove);
            assert_eq!(annotation.remove_reason, Some(RemoveReason::DuplicateData));
            assert_eq!(annotation.scope, Scope::ThisDocument);
            assert!((annotation.confidence - 0.74).abs() < 1e-6);
            assert_eq!(
                result.explanations[id].source,
                ExplanationSource::DuplicateDetector
            );
        }
    }

    #[test]
    fn test_critical_duplicate_is_kept() {
        let text = "Heparin drip at 18 units/kg/hr, titrate per anti-Xa protocol overnight.";
        let chunks = vec![
            Chunk::new("chunk-0", text, ChunkType::Unknown).with_critical(CriticalCategory::Infusions),
            Chunk::new("chunk-1", text, ChunkType::Unknown).with_critical(CriticalCategory::Infusions),
        ];
        let result = classify_document(&chunks, &[], &DocumentContext::new());
        assert_eq!(result.label_of("chunk-0"), Some(Label::Keep));
        assert_eq!(
            result.explanations["chunk-0"].source,
            ExplanationSource::CriticalSafety
        );
        assert!((result.annotations["chunk-0"].confidence - 0.60).abs() < 1e-6);
        assert_eq!(result.stats.safety_overrides, 2);
    }

    #[test]
    fn test_learned_remove_on_critical_chunk_is_overridden() {
        let chunks = vec![
            Chunk::new("chunk-0", "Code status: DNR", ChunkType::Unknown)
                .with_critical(CriticalCategory::CodeStatus),
        ];
        let corpus = vec![learned("code status dnr", Label::Remove, Scope::Global)];
        let result = classify_document(&chunks, &corpus, &DocumentContext::new());
        let annotation = &result.annotations["chunk-0"];
        assert_eq!(annotation.label, Label::Keep);
        // max(0.95 - 0.15, 0.60)
        assert!((annotation.confidence - 0.80).abs() < 1e-6);
        assert!(
            result.explanations["chunk-0"]
                .signals
                .contains(&"overridden:learned_exact".to_string())
        );
    }

    #[test]
    fn test_heuristic_path_and_unlabeled_chunks() {
        let chunks = vec![
            Chunk::new("chunk-0", "y".repeat(500), ChunkType::Paragraph),
            Chunk::new("chunk-1", "Feeling better.", ChunkType::Unknown),
        ];
        let result = classify_document(&chunks, &[], &DocumentContext::new());

        let annotation = &result.annotations["chunk-0"];
        assert_eq!(annotation.label, Label::Condense);
        assert_eq!(
            annotation.condense_strategy,
            Some(CondenseStrategy::ProblemBasedSummary)
        );
        assert!((annotation.confidence - 0.62).abs() < 1e-6);

        assert!(!result.annotations.contains_key("chunk-1"));
        assert!(!result.explanations.contains_key("chunk-1"));
        assert_eq!(result.stats.annotated_chunks, 1);
        assert_eq!(result.stats.condense, 1);
    }

    #[test]
    fn test_maps_follow_chunk_order() {
        let engine = SuggestionEngine::new();
        let (chunks, result) = engine.process_note(
            "HPI\nPatient seen and examined.\n\nASSESSMENT AND PLAN\nContinue warfarin 5 mg daily.",
            &[],
            &DocumentContext::new(),
        );
        let chunk_order: Vec<&str> = chunks
            .iter()
            .map(|c| c.id.as_str())
            .filter(|id| result.annotations.contains_key(*id))
            .collect();
        let annotation_order: Vec<&str> = result.annotations.keys().map(String::as_str).collect();
        assert_eq!(annotation_order, chunk_order);
        assert_eq!(
            result.annotations.keys().collect::<Vec<_>>(),
            result.explanations.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_empty_document() {
        let result = classify_document(&[], &[], &DocumentContext::new());
        assert!(result.annotations.is_empty());
        assert!(result.extracted_fields.is_empty());
        assert_eq!(result.stats, SuggestionStats::default());
    }
}
