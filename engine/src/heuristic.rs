//! Ordered pattern rules proposing a label from chunk type and textual cues.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::chunker::{Chunk, ChunkType};
use crate::label::{CondenseStrategy, Label, RemoveReason};
use crate::patterns::PatternSet;

/// Reused parser suggestions never exceed this confidence.
const MAX_REUSED_CONFIDENCE: f32 = 0.95;

/// Bonus for a parser suggestion no table rule overrode.
const REUSED_SUGGESTION_BONUS: f32 = 0.05;

/// Candidate label proposed by the heuristic table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicCandidate {
    /// Name of the rule that fired.
    pub rule: String,
    pub label: Label,
    pub confidence: f32,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_reason: Option<RemoveReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condense_strategy: Option<CondenseStrategy>,
}

/// One entry of the rule table.
struct HeuristicRule {
    name: &'static str,
    applies: fn(&Chunk) -> bool,
    label: Label,
    confidence: f32,
    reason: &'static str,
    remove_reason: Option<RemoveReason>,
    condense_strategy: Option<CondenseStrategy>,
}

impl HeuristicRule {
    fn candidate(&self) -> HeuristicCandidate {
        HeuristicCandidate {
            rule: self.name.to_string(),
            label: self.label,
            confidence: self.confidence,
            reason: self.reason.to_string(),
            remove_reason: self.remove_reason,
            condense_strategy: self.condense_strategy,
        }
    }
}

static NORMAL_ROS_EXAM: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"(?i)\b(review of systems|ros)\b:?\s*(is\s+)?(otherwise\s+)?negative",
        r"(?i)all other systems (were |are )?(reviewed and )?(are )?negative",
        r"(?i)\b1[02]-? ?point (ros|review of systems)",
        r"(?i)negative except as (noted|stated|per) (above|in (the )?hpi)",
        r"(?i)\bno acute distress\b",
        r"(?i)normocephalic,? atraumatic",
        r"(?i)\brrr\b,? no (murmurs|m/r/g)",
        r"(?i)clear to auscultation bilaterally",
        r"(?i)\bctab\b",
        r"(?i)soft,? non-?tender,? non-?distended",
        r"(?i)\bno (clubbing|cyanosis),? (clubbing|cyanosis|or edema|edema)",
        r"(?i)alert and oriented x ?[34]",
        r"(?i)\bexam(ination)? (is )?(within normal limits|unremarkable)",
    ])
});

static ADMINISTRATIVE: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"(?i)please (call|contact|page) (with|for|if)",
        r"(?i)\b(cpt|icd-?10)\b",
        r"(?i)\blevel of service\b",
        r"(?i)\b(minutes|time) (were |was )?spent\b",
        r"(?i)counseling and(/or)? coordination of care",
        r"(?i)\bfor billing\b",
        r"(?i)prior authorization",
        r"(?i)\bthis note (was|has been) (generated|dictated|created)",
        r"(?i)\bvoice recognition\b",
    ])
});

static COPIED_PRIOR: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"(?i)\bcop(y|ied) forward\b",
        r"(?i)\bcopied from (the )?(prior|previous)",
        r"(?i)\bcarried forward from (the )?(prior|previous)",
    ])
});

static UNCHANGED_FROM_PRIOR: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"(?i)\bunchanged\b",
        r"(?i)\bno (significant )?interval change\b",
        r"(?i)\bstable (when )?(compared|relative) (to|with) (the )?prior\b",
    ])
});

fn is_critical(chunk: &Chunk) -> bool {
    chunk.is_critical
}

fn is_section_header(chunk: &Chunk) -> bool {
    chunk.chunk_type == ChunkType::SectionHeader
}

fn is_attestation(chunk: &Chunk) -> bool {
    chunk.chunk_type == ChunkType::Attestation
}

fn is_normal_ros_exam(chunk: &Chunk) -> bool {
    NORMAL_ROS_EXAM.is_match(&chunk.text)
}

fn is_administrative(chunk: &Chunk) -> bool {
    ADMINISTRATIVE.is_match(&chunk.text)
}

fn is_copied_prior(chunk: &Chunk) -> bool {
    COPIED_PRIOR.is_match(&chunk.text)
}

fn is_repeated_imaging(chunk: &Chunk) -> bool {
    chunk.chunk_type == ChunkType::ImagingReport && UNCHANGED_FROM_PRIOR.is_match(&chunk.text)
}

fn is_repeated_labs(chunk: &Chunk) -> bool {
    chunk.chunk_type == ChunkType::LabValues && UNCHANGED_FROM_PRIOR.is_match(&chunk.text)
}

fn is_long_lab_panel(chunk: &Chunk) -> bool {
    chunk.chunk_type == ChunkType::LabValues && chunk.char_len() > 250
}

fn is_long_imaging_report(chunk: &Chunk) -> bool {
    chunk.chunk_type == ChunkType::ImagingReport && chunk.char_len() > 280
}

fn is_long_medication_list(chunk: &Chunk) -> bool {
    chunk.chunk_type == ChunkType::MedicationList && chunk.text.lines().count() > 8
}

fn is_long_paragraph(chunk: &Chunk) -> bool {
    chunk.chunk_type == ChunkType::Paragraph && chunk.char_len() > 450
}

/// The rule table. Rules are mutually exclusive: the first that applies wins.
const RULES: &[HeuristicRule] = &[
    HeuristicRule {
        name: "critical_content",
        applies: is_critical,
        label: Label::Keep,
        confidence: 0.95,
        reason: "critical clinical indicator",
        remove_reason: None,
        condense_strategy: None,
    },
    HeuristicRule {
        name: "section_header",
        applies: is_section_header,
        label: Label::Keep,
        confidence: 0.90,
        reason: "section header",
        remove_reason: None,
        condense_strategy: None,
    },
    HeuristicRule {
        name: "attestation",
        applies: is_attestation,
        label: Label::Remove,
        confidence: 0.82,
        reason: "billing or attestation boilerplate",
        remove_reason: Some(RemoveReason::BillingAttestation),
        condense_strategy: None,
    },
    HeuristicRule {
        name: "normal_ros_exam",
        applies: is_normal_ros_exam,
        label: Label::Remove,
        confidence: 0.78,
        reason: "normal review of systems or exam",
        remove_reason: Some(RemoveReason::NormalRosExam),
        condense_strategy: None,
    },
    HeuristicRule {
        name: "administrative_text",
        applies: is_administrative,
        label: Label::Remove,
        confidence: 0.72,
        reason: "administrative language",
        remove_reason: Some(RemoveReason::AdministrativeText),
        condense_strategy: None,
    },
    HeuristicRule {
        name: "copied_prior_note",
        applies: is_copied_prior,
        label: Label::Remove,
        confidence: 0.76,
        reason: "copied forward from a prior note",
        remove_reason: Some(RemoveReason::CopiedPriorNote),
        condense_strategy: None,
    },
    HeuristicRule {
        name: "repeated_imaging",
        applies: is_repeated_imaging,
        label: Label::Remove,
        confidence: 0.74,
        reason: "imaging unchanged from prior",
        remove_reason: Some(RemoveReason::RepeatedImaging),
        condense_strategy: None,
    },
    HeuristicRule {
        name: "repeated_labs",
        applies: is_repeated_labs,
        label: Label::Remove,
        confidence: 0.72,
        reason: "labs unchanged from prior",
        remove_reason: Some(RemoveReason::RepeatedLabs),
        condense_strategy: None,
    },
    HeuristicRule {
        name: "long_lab_panel",
        applies: is_long_lab_panel,
        label: Label::Condense,
        confidence: 0.70,
        reason: "long lab panel",
        remove_reason: None,
        condense_strategy: Some(CondenseStrategy::AbnormalOnly),
    },
    HeuristicRule {
        name: "long_imaging_report",
        applies: is_long_imaging_report,
        label: Label::Condense,
        confidence: 0.68,
        reason: "long imaging report",
        remove_reason: None,
        condense_strategy: Some(CondenseStrategy::OneLineSummary),
    },
    HeuristicRule {
        name: "long_medication_list",
        applies: is_long_medication_list,
        label: Label::Condense,
        confidence: 0.64,
        reason: "long medication list",
        remove_reason: None,
        condense_strategy: Some(CondenseStrategy::OneLineSummary),
    },
    HeuristicRule {
        name: "long_paragraph",
        applies: is_long_paragraph,
        label: Label::Condense,
        confidence: 0.62,
        reason: "long narrative paragraph",
        remove_reason: None,
        condense_strategy: Some(CondenseStrategy::ProblemBasedSummary),
    },
];

/// Run the rule table over `chunk`.
///
/// When no table rule applies, a parser suggestion on the chunk is reused
/// with a small bonus. Returns `None` when neither exists.
pub fn classify(chunk: &Chunk) -> Option<HeuristicCandidate> {
    if let Some(rule) = RULES.iter().find(|rule| (rule.applies)(chunk)) {
        return Some(rule.candidate());
    }

    chunk.suggestion.as_ref().map(|suggestion| HeuristicCandidate {
        rule: "parser_suggestion".to_string(),
        label: suggestion.label,
        confidence: (suggestion.confidence + REUSED_SUGGESTION_BONUS).min(MAX_REUSED_CONFIDENCE),
        reason: "parser rule match".to_string(),
        remove_reason: suggestion.remove_reason,
        condense_strategy: suggestion.condense_strategy,
    })
}
