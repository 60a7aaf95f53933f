//! Weak-signal fusion and the critical-content safety override.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunker::Chunk;
use crate::heuristic::HeuristicCandidate;
use crate::label::{
    Annotation, CondenseStrategy, ExplanationSource, Label, ModelExplanation, RemoveReason,
};

/// Ceiling for the parser suggestion when it enters fusion as its own signal.
const PARSER_SIGNAL_CAP: f32 = 0.90;
const PARSER_SIGNAL_BONUS: f32 = 0.04;

const CORROBORATION_STEP: f32 = 0.05;
const CORROBORATION_MAX: f32 = 0.12;
const FUSED_CONFIDENCE_CAP: f32 = 0.97;

const SAFETY_PENALTY: f32 = 0.15;
const SAFETY_FLOOR: f32 = 0.60;
pub const SAFETY_REASON: &str = "critical content retained despite removal signal";

/// Where a fusion signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    HeuristicRule,
    ParserSuggestion,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeuristicRule => "heuristic_rule",
            Self::ParserSuggestion => "parser_suggestion",
        }
    }
}

/// One weak piece of evidence about a chunk's label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub source: SignalSource,
    pub label: Label,
    pub confidence: f32,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_reason: Option<RemoveReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condense_strategy: Option<CondenseStrategy>,
}

impl From<HeuristicCandidate> for Signal {
    fn from(candidate: HeuristicCandidate) -> Self {
        Self {
            source: SignalSource::HeuristicRule,
            label: candidate.label,
            confidence: candidate.confidence,
            reason: candidate.reason,
            remove_reason: candidate.remove_reason,
            condense_strategy: candidate.condense_strategy,
        }
    }
}

/// Final annotation for a chunk together with its explanation.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub annotation: Annotation,
    pub explanation: ModelExplanation,
}

impl Decision {
    pub fn new(annotation: Annotation, explanation: ModelExplanation) -> Self {
        Self {
            annotation,
            explanation,
        }
    }

    /// Force KEEP on a critical chunk that would otherwise be removed.
    ///
    /// Returns whether the override fired.
    pub fn enforce_safety(&mut self, chunk: &Chunk) -> bool {
        if !chunk.is_critical || self.annotation.label != Label::Remove {
            return false;
        }

        let confidence = (self.annotation.confidence - SAFETY_PENALTY).max(SAFETY_FLOOR);
        let previous_source = self.explanation.source;

        self.annotation.label = Label::Keep;
        self.annotation.confidence = confidence;
        self.annotation.remove_reason = None;

        let mut signals = std::mem::take(&mut self.explanation.signals);
        signals.push(format!("overridden:{}", previous_source.as_str()));
        if let Some(category) = chunk.critical_category {
            signals.push(format!("critical:{}", category.as_str()));
        }
        self.explanation =
            ModelExplanation::new(ExplanationSource::CriticalSafety, confidence, SAFETY_REASON)
                .with_signals(signals);

        debug!(chunk_id = %chunk.id, "critical content kept despite removal signal");
        true
    }
}

/// Gather the fusion inputs for `chunk`.
///
/// The parser suggestion always enters as a separate signal, even when the
/// heuristic table already reused it: agreement between the two raises the
/// fused confidence.
pub fn collect_signals(chunk: &Chunk, heuristic: Option<HeuristicCandidate>) -> Vec<Signal> {
    let mut signals: Vec<Signal> = heuristic.into_iter().map(Signal::from).collect();

    if let Some(suggestion) = chunk.suggestion.as_ref().filter(|s| s.confidence > 0.0) {
        signals.push(Signal {
            source: SignalSource::ParserSuggestion,
            label: suggestion.label,
            confidence: (suggestion.confidence + PARSER_SIGNAL_BONUS).min(PARSER_SIGNAL_CAP),
            reason: "parser suggestion".to_string(),
            remove_reason: suggestion.remove_reason,
            condense_strategy: suggestion.condense_strategy,
        });
    }

    signals
}

struct LabelGroup<'a> {
    label: Label,
    members: Vec<&'a Signal>,
}

impl LabelGroup<'_> {
    fn score(&self) -> f32 {
        let n = self.members.len();
        let average = self.members.iter().map(|s| s.confidence).sum::<f32>() / n as f32;
        // A lone signal keeps its own confidence.
        let boost = if n >= 2 {
            (n as f32 * CORROBORATION_STEP).min(CORROBORATION_MAX)
        } else {
            0.0
        };
        (average + boost).min(FUSED_CONFIDENCE_CAP)
    }

    fn distinct_sources(&self) -> usize {
        let mut sources: Vec<SignalSource> = Vec::new();
        for member in &self.members {
            if !sources.contains(&member.source) {
                sources.push(member.source);
            }
        }
        sources.len()
    }

    /// Highest-confidence member, earliest on ties.
    fn lead(&self) -> Option<&Signal> {
        self.members.iter().copied().fold(None, |best, signal| match best {
            Some(b) if b.confidence >= signal.confidence => Some(b),
            _ => Some(signal),
        })
    }
}

/// Merge `signals` into one decision, then apply the safety override.
///
/// Returns `None` when there are no signals.
pub fn fuse(chunk: &Chunk, signals: &[Signal]) -> Option<Decision> {
    let mut groups: Vec<LabelGroup<'_>> = Vec::new();
    for signal in signals {
        match groups.iter_mut().find(|g| g.label == signal.label) {
            Some(group) => group.members.push(signal),
            None => groups.push(LabelGroup {
                label: signal.label,
                members: vec![signal],
            }),
        }
    }

    let mut winner: Option<(&LabelGroup<'_>, f32)> = None;
    for group in &groups {
        let score = group.score();
        if winner.is_none_or(|(_, best)| score > best) {
            winner = Some((group, score));
        }
    }
    let (group, confidence) = winner?;
    let lead = group.lead()?;

    let source = if group.distinct_sources() > 1 {
        ExplanationSource::CombinedSignals
    } else {
        ExplanationSource::HeuristicRules
    };

    let mut trail: Vec<String> = signals
        .iter()
        .map(|s| format!("{}:{}:{:.2}", s.source.as_str(), s.label.as_str(), s.confidence))
        .collect();
    trail.push(format!("group_size:{}", group.members.len()));

    let annotation = Annotation::suggested(chunk.id.clone(), group.label, confidence)
        .with_remove_reason(if group.label == Label::Remove {
            lead.remove_reason
        } else {
            None
        })
        .with_condense_strategy(if group.label == Label::Condense {
            lead.condense_strategy
        } else {
            None
        });
    let explanation =
        ModelExplanation::new(source, confidence, lead.reason.clone()).with_signals(trail);

    let mut decision = Decision::new(annotation, explanation);
    decision.enforce_safety(chunk);
    Some(decision)
}
