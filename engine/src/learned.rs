//! Matching chunks against previously confirmed human annotations.
//!
//! The corpus is supplied by the caller on every call. A match is a pure
//! lexical similarity search: exact normalized text first, otherwise token-set
//! Jaccard similarity boosted for matching section types and weighted by the
//! breadth of the annotation's scope.

use std::cmp::Reverse;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunker::{Chunk, ChunkType};
use crate::config::MatcherConfig;
use crate::label::{
    Annotation, CondenseStrategy, ExplanationSource, Label, ModelExplanation, RemoveReason, Scope,
};
use crate::similarity::{jaccard_similarity, normalize_text, token_set};

/// Learned matches never report more than this confidence.
const MAX_LEARNED_CONFIDENCE: f32 = 0.95;

/// Scores at or above this are reported as exact matches.
const EXACT_SCORE: f32 = 0.95;

/// A human-confirmed annotation replayed as a matching rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedAnnotation {
    pub chunk_id: String,
    pub raw_text: String,
    pub section_type: ChunkType,
    pub label: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_reason: Option<RemoveReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condense_strategy: Option<CondenseStrategy>,
    pub scope: Scope,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
}

impl LearnedAnnotation {
    /// Turn an accepted or corrected annotation into a corpus entry.
    pub fn confirm(
        chunk: &Chunk,
        annotation: &Annotation,
        scope: Scope,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            raw_text: chunk.text.clone(),
            section_type: chunk.chunk_type,
            label: annotation.label,
            remove_reason: annotation.remove_reason,
            condense_strategy: annotation.condense_strategy,
            scope,
            timestamp: Utc::now(),
            user_id: user_id.into(),
        }
    }
}

/// What is known about the document being classified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl DocumentContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_note_type(mut self, note_type: impl Into<String>) -> Self {
        self.note_type = Some(note_type.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Trust multiplier for an annotation confirmed under `scope`.
    pub fn scope_weight(&self, scope: Scope) -> f32 {
        match scope {
            Scope::NoteType if self.note_type.is_some() => 0.95,
            Scope::NoteType => 0.75,
            Scope::Service if self.service.is_some() => 0.90,
            Scope::Service => 0.70,
            Scope::Global => 0.85,
            Scope::ThisDocument => 0.80,
        }
    }
}

/// The best corpus entry for a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnedMatch<'a> {
    pub entry: &'a LearnedAnnotation,
    /// Position of the entry in the corpus.
    pub index: usize,
    pub similarity: f32,
    pub score: f32,
    pub exact: bool,
}

impl LearnedMatch<'_> {
    /// Convert the match into an annotation and its explanation.
    pub fn into_suggestion(self, chunk_id: &str) -> (Annotation, ModelExplanation) {
        let confidence = self.score.min(MAX_LEARNED_CONFIDENCE);
        let source = if self.score >= EXACT_SCORE {
            ExplanationSource::LearnedExact
        } else {
            ExplanationSource::LearnedSimilar
        };

        let annotation = Annotation::suggested(chunk_id, self.entry.label, confidence)
            .with_remove_reason(self.entry.remove_reason)
            .with_condense_strategy(self.entry.condense_strategy)
            .with_scope(self.entry.scope);

        let reason = if self.exact {
            format!(
                "identical to confirmed {} annotation",
                self.entry.label.as_str()
            )
        } else {
            format!(
                "similar to confirmed {} annotation (similarity {:.2})",
                self.entry.label.as_str(),
                self.similarity
            )
        };
        let explanation = ModelExplanation::new(source, confidence, reason).with_signals(vec![
            format!("learned:{}", self.entry.chunk_id),
            format!("scope:{}", self.entry.scope.as_str()),
            format!("score:{:.3}", self.score),
        ]);

        (annotation, explanation)
    }
}

/// Similarity search over a learned corpus.
pub struct LearnedRuleMatcher {
    config: MatcherConfig,
}

impl LearnedRuleMatcher {
    pub fn new() -> Self {
        Self::with_config(MatcherConfig::default())
    }

    pub fn with_config(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Find the accepted match for `chunk`, if any entry scores high enough.
    ///
    /// The first exact match wins outright. Otherwise the highest score wins,
    /// earliest entry on ties.
    pub fn best_match<'a>(
        &self,
        chunk: &Chunk,
        corpus: &'a [LearnedAnnotation],
        context: &DocumentContext,
    ) -> Option<LearnedMatch<'a>> {
        let normalized = normalize_text(&chunk.text);
        if normalized.is_empty() {
            return None;
        }
        let tokens = token_set(&normalized);
        let mut best: Option<LearnedMatch<'a>> = None;

        for (index, entry) in corpus.iter().enumerate() {
            let Some(candidate) = self.score_entry(chunk, &normalized, &tokens, index, entry, context)
            else {
                continue;
            };
            if candidate.exact {
                debug!("Chunk {} exactly matches learned entry {}", chunk.id, index);
                return Some(candidate);
            }
            if best.as_ref().is_none_or(|current| candidate.score > current.score) {
                best = Some(candidate);
            }
        }

        best.filter(|candidate| candidate.score >= self.config.accept_threshold)
    }

    /// Up to `k` scored corpus entries for `chunk`, best first.
    ///
    /// Unlike [`best_match`](Self::best_match) this ignores the acceptance
    /// threshold, so reviewers can see near misses.
    pub fn ranked_matches<'a>(
        &self,
        chunk: &Chunk,
        corpus: &'a [LearnedAnnotation],
        context: &DocumentContext,
        k: usize,
    ) -> Vec<LearnedMatch<'a>> {
        let normalized = normalize_text(&chunk.text);
        if normalized.is_empty() {
            return Vec::new();
        }
        let tokens = token_set(&normalized);

        let mut scored: Vec<(OrderedFloat<f32>, LearnedMatch<'a>)> = corpus
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                self.score_entry(chunk, &normalized, &tokens, index, entry, context)
            })
            .map(|candidate| (OrderedFloat(candidate.score), candidate))
            .collect();

        // Stable sort keeps corpus order among equal scores.
        scored.sort_by_key(|(score, _)| Reverse(*score));
        scored.into_iter().take(k).map(|(_, candidate)| candidate).collect()
    }

    fn score_entry<'a>(
        &self,
        chunk: &Chunk,
        normalized: &str,
        tokens: &HashSet<&str>,
        index: usize,
        entry: &'a LearnedAnnotation,
        context: &DocumentContext,
    ) -> Option<LearnedMatch<'a>> {
        let entry_normalized = normalize_text(&entry.raw_text);
        if entry_normalized.is_empty() {
            return None;
        }

        if entry_normalized == normalized {
            return Some(LearnedMatch {
                entry,
                index,
                similarity: 1.0,
                score: 1.0,
                exact: true,
            });
        }

        let similarity = jaccard_similarity(tokens, &token_set(&entry_normalized));
        if similarity < self.config.min_similarity {
            return None;
        }

        let type_boost = if chunk.chunk_type == entry.section_type {
            self.config.type_match_boost
        } else {
            0.0
        };
        let score = ((similarity + type_boost) * context.scope_weight(entry.scope)).min(1.0);

        Some(LearnedMatch {
            entry,
            index,
            similarity,
            score,
            exact: false,
        })
    }
}

impl Default for LearnedRuleMatcher {
    fn default() -> Self {
        Self::new()
    }
}
