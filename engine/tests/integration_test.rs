//! Integration tests for note chunking and classification.
//!
//! These run the whole engine over fixture notes and a fixture corpus of
//! confirmed annotations.

use std::path::PathBuf;

use noteprune_engine::{
    Annotation, Chunk, ChunkType, CondenseStrategy, CriticalCategory, DocumentContext,
    DocumentSuggestions, EngineConfig, ExplanationSource, FieldCategory, Label, LearnedAnnotation,
    RemoveReason, Scope, SuggestionEngine, chunk_document, classify_document,
};
use pretty_assertions::assert_eq;

/// Get the path to the test fixtures directory.
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn progress_note() -> String {
    std::fs::read_to_string(fixtures_dir().join("progress_note.txt")).unwrap()
}

fn corpus() -> Vec<LearnedAnnotation> {
    let json = std::fs::read_to_string(fixtures_dir().join("corpus.json")).unwrap();
    serde_json::from_str(&json).unwrap()
}

fn find<'a>(chunks: &'a [Chunk], starts_with: &str) -> &'a Chunk {
    chunks
        .iter()
        .find(|c| c.text.starts_with(starts_with))
        .unwrap_or_else(|| panic!("no chunk starting with {starts_with:?}"))
}

/// Labels, reasons, confidences and sources, without timestamps.
fn decisions(
    result: &DocumentSuggestions,
) -> Vec<(String, Label, Option<RemoveReason>, String, ExplanationSource)> {
    result
        .annotations
        .iter()
        .map(|(id, a)| {
            (
                id.clone(),
                a.label,
                a.remove_reason,
                format!("{:.4}", a.confidence),
                result.explanations[id].source,
            )
        })
        .collect()
}

#[test]
fn test_chunks_reconstruct_the_note() {
    let note = progress_note();
    let chunks = chunk_document(&note);
    assert_eq!(chunks.len(), 14);

    for chunk in &chunks {
        assert_eq!(&note[chunk.start_offset..chunk.end_offset], chunk.text);
    }
    for pair in chunks.windows(2) {
        assert!(pair[0].end_offset <= pair[1].start_offset);
        assert!(note[pair[0].end_offset..pair[1].start_offset].trim().is_empty());
    }

    let types: Vec<ChunkType> = chunks.iter().map(|c| c.chunk_type).collect();
    assert_eq!(
        types.iter().filter(|t| **t == ChunkType::SectionHeader).count(),
        6
    );
    assert_eq!(find(&chunks, "Mr. Smith").chunk_type, ChunkType::Paragraph);
    assert_eq!(find(&chunks, "Na 138").chunk_type, ChunkType::LabValues);
    assert_eq!(
        find(&chunks, "Electronically").chunk_type,
        ChunkType::Attestation
    );
}

#[test]
fn test_classifies_progress_note_without_corpus() {
    let chunks = chunk_document(&progress_note());
    let result = classify_document(&chunks, &[], &DocumentContext::new());

    let header = &result.annotations[&find(&chunks, "ASSESSMENT AND PLAN").id];
    assert_eq!(header.label, Label::Keep);

    let hpi = &result.annotations[&find(&chunks, "Mr. Smith").id];
    assert_eq!(hpi.label, Label::Condense);
    assert_eq!(
        hpi.condense_strategy,
        Some(CondenseStrategy::ProblemBasedSummary)
    );
    assert!((hpi.confidence - 0.62).abs() < 1e-6);

    let ros_id = &find(&chunks, "Negative for chest pain").id;
    assert_eq!(
        result.annotations[ros_id].remove_reason,
        Some(RemoveReason::NormalRosExam)
    );
    assert_eq!(
        result.explanations[ros_id].source,
        ExplanationSource::HeuristicRules
    );

    let attestation_id = &find(&chunks, "Electronically").id;
    assert_eq!(
        result.annotations[attestation_id].remove_reason,
        Some(RemoveReason::BillingAttestation)
    );
    assert_eq!(
        result.explanations[attestation_id].source,
        ExplanationSource::CombinedSignals
    );

    let duplicates: Vec<&Chunk> = chunks
        .iter()
        .filter(|c| c.text.starts_with("Continue diuresis"))
        .collect();
    assert_eq!(duplicates.len(), 2);
    for chunk in duplicates {
        let annotation = &result.annotations[&chunk.id];
        assert_eq!(annotation.label, Label::Remove);
        assert_eq!(annotation.remove_reason, Some(RemoveReason::DuplicateData));
        assert_eq!(annotation.scope, Scope::ThisDocument);
        assert!((annotation.confidence - 0.74).abs() < 1e-6);
    }

    // Short chunks with no matching rule stay unlabeled.
    let labs_id = &find(&chunks, "Na 138").id;
    assert!(!result.annotations.contains_key(labs_id));
    assert!(!result.explanations.contains_key(labs_id));

    let stats = &result.stats;
    assert_eq!(stats.total_chunks, 14);
    assert_eq!(stats.annotated_chunks, 12);
    assert_eq!(stats.keep, 7);
    assert_eq!(stats.condense, 1);
    assert_eq!(stats.remove, 4);
    assert_eq!(stats.critical_chunks, 1);
    assert_eq!(stats.duplicate_chunks, 2);
    assert_eq!(stats.learned_matches, 0);
}

#[test]
fn test_learned_corpus_outranks_other_signals() {
    let chunks = chunk_document(&progress_note());
    let context = DocumentContext::new().with_note_type("progress");
    let result = classify_document(&chunks, &corpus(), &context);

    let ros_id = &find(&chunks, "Negative for chest pain").id;
    assert_eq!(
        result.explanations[ros_id].source,
        ExplanationSource::LearnedExact
    );
    assert!(result.annotations[ros_id].confidence >= 0.95);
    assert_eq!(result.annotations[ros_id].scope, Scope::NoteType);

    // The repeated plan paragraphs match a confirmed KEEP instead of being
    // removed as duplicates.
    for chunk in chunks
        .iter()
        .filter(|c| c.text.starts_with("Continue diuresis"))
    {
        assert_eq!(result.label_of(&chunk.id), Some(Label::Keep));
        assert_eq!(
            result.explanations[&chunk.id].source,
            ExplanationSource::LearnedSimilar
        );
    }
    assert_eq!(result.stats.learned_matches, 3);
}

#[test]
fn test_critical_chunks_are_never_removed() {
    let chunks = chunk_document(&progress_note());
    let result = classify_document(&chunks, &corpus(), &DocumentContext::new());

    let warfarin = find(&chunks, "Patient is on warfarin");
    assert!(warfarin.is_critical);
    assert_eq!(
        warfarin.critical_category,
        Some(CriticalCategory::Anticoagulation)
    );
    assert_eq!(result.label_of(&warfarin.id), Some(Label::Keep));

    for chunk in chunks.iter().filter(|c| c.is_critical) {
        assert_ne!(result.label_of(&chunk.id), Some(Label::Remove));
    }
}

#[test]
fn test_confirmed_removal_of_critical_text_is_overridden() {
    let chunks = chunk_document("Heparin drip per protocol, goal anti-Xa 0.3 to 0.7 overnight.");
    assert_eq!(chunks.len(), 1);

    let annotation = Annotation::suggested(&chunks[0].id, Label::Remove, 0.9)
        .with_remove_reason(Some(RemoveReason::CopiedPriorNote));
    let corpus = vec![LearnedAnnotation::confirm(
        &chunks[0],
        &annotation,
        Scope::Global,
        "dr-lee",
    )];

    let result = classify_document(&chunks, &corpus, &DocumentContext::new());
    let explanation = &result.explanations[&chunks[0].id];
    assert_eq!(result.label_of(&chunks[0].id), Some(Label::Keep));
    assert_eq!(explanation.source, ExplanationSource::CriticalSafety);
    assert_eq!(
        explanation.reason,
        "critical content retained despite removal signal"
    );
    assert!(result.annotations[&chunks[0].id].remove_reason.is_none());
    assert_eq!(result.stats.safety_overrides, 1);
}

#[test]
fn test_classification_is_idempotent() {
    let chunks = chunk_document(&progress_note());
    let corpus = corpus();
    let context = DocumentContext::new().with_note_type("progress");

    let first = classify_document(&chunks, &corpus, &context);
    let second = classify_document(&chunks, &corpus, &context);
    assert_eq!(decisions(&first), decisions(&second));
    assert_eq!(first.stats, second.stats);

    // Chunking is deterministic too.
    assert_eq!(chunk_document(&progress_note()), chunks);
}

#[test]
fn test_extracts_fields_from_note() {
    let engine = SuggestionEngine::new();
    let (_, result) = engine.process_note(&progress_note(), &[], &DocumentContext::new());

    let meds: Vec<_> = result
        .extracted_fields
        .iter()
        .filter(|f| f.category == FieldCategory::Medication)
        .collect();
    assert_eq!(meds.len(), 1);
    assert_eq!(meds[0].label, "warfarin");
    assert_eq!(meds[0].value, "5mg");

    let labs: Vec<&str> = result
        .extracted_fields
        .iter()
        .filter(|f| f.category == FieldCategory::LabValue)
        .map(|f| f.label.as_str())
        .collect();
    assert_eq!(labs, vec!["Na", "K", "BUN", "Cr"]);
    assert_eq!(result.stats.extracted_fields, result.extracted_fields.len());
}

#[test]
fn test_reference_scenarios() {
    let warfarin = chunk_document("Patient is on warfarin 5mg daily");
    assert_eq!(warfarin.len(), 1);
    assert_eq!(
        warfarin[0].critical_category,
        Some(CriticalCategory::Anticoagulation)
    );
    let result = classify_document(&warfarin, &[], &DocumentContext::new());
    assert_eq!(result.label_of(&warfarin[0].id), Some(Label::Keep));

    let header = chunk_document("ASSESSMENT AND PLAN");
    assert_eq!(header.len(), 1);
    assert_eq!(header[0].chunk_type, ChunkType::SectionHeader);
    assert_eq!(header[0].suggested_label(), Some(Label::Keep));
    assert!((header[0].suggested_confidence() - 0.90).abs() < 1e-6);

    let paragraph = "The patient continues to make slow progress with physical therapy. ".repeat(8);
    let paragraph = paragraph.trim();
    assert!(paragraph.len() > 450);
    let chunks = chunk_document(paragraph);
    assert_eq!(chunks[0].chunk_type, ChunkType::Paragraph);
    let result = classify_document(&chunks, &[], &DocumentContext::new());
    let annotation = &result.annotations[&chunks[0].id];
    assert_eq!(annotation.label, Label::Condense);
    assert!((annotation.confidence - 0.62).abs() < 1e-6);
}

#[test]
fn test_config_from_file_changes_thresholds() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(
        &mut file,
        br#"{"duplicates": {"min_normalized_chars": 500}}"#,
    )
    .unwrap();
    let config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.duplicates.min_normalized_chars, 500);

    let engine = SuggestionEngine::with_config(config);
    let (chunks, result) = engine.process_note(&progress_note(), &[], &DocumentContext::new());
    assert_eq!(result.stats.duplicate_chunks, 0);

    // Without the duplicate signal the short plan paragraphs match no rule.
    let plan = find(&chunks, "Continue diuresis");
    assert!(!result.annotations.contains_key(&plan.id));
}
