//! Labels, annotations and explanations produced by the engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User id stamped on annotations the engine proposes.
pub const ENGINE_USER_ID: &str = "noteprune-engine";

/// Suggested disposition for a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    Keep,
    Condense,
    Remove,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "KEEP",
            Self::Condense => "CONDENSE",
            Self::Remove => "REMOVE",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a chunk is proposed for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveReason {
    DuplicateData,
    BillingAttestation,
    NormalRosExam,
    AdministrativeText,
    CopiedPriorNote,
    RepeatedImaging,
    RepeatedLabs,
}

impl RemoveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateData => "duplicate_data",
            Self::BillingAttestation => "billing_attestation",
            Self::NormalRosExam => "normal_ros_exam",
            Self::AdministrativeText => "administrative_text",
            Self::CopiedPriorNote => "copied_prior_note",
            Self::RepeatedImaging => "repeated_imaging",
            Self::RepeatedLabs => "repeated_labs",
        }
    }
}

/// How a chunk proposed for condensing should be shortened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CondenseStrategy {
    AbnormalOnly,
    OneLineSummary,
    ProblemBasedSummary,
}

impl CondenseStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AbnormalOnly => "abnormal_only",
            Self::OneLineSummary => "one_line_summary",
            Self::ProblemBasedSummary => "problem_based_summary",
        }
    }
}

/// Breadth over which a confirmed annotation is trusted for future matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    ThisDocument,
    NoteType,
    Service,
    Global,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThisDocument => "this_document",
            Self::NoteType => "note_type",
            Self::Service => "service",
            Self::Global => "global",
        }
    }
}

/// A label decision for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub chunk_id: String,
    pub label: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_reason: Option<RemoveReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condense_strategy: Option<CondenseStrategy>,
    pub scope: Scope,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
}

impl Annotation {
    /// Create an engine-proposed annotation scoped to the current document.
    pub fn suggested(chunk_id: impl Into<String>, label: Label, confidence: f32) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            label,
            remove_reason: None,
            condense_strategy: None,
            scope: Scope::ThisDocument,
            confidence,
            timestamp: Utc::now(),
            user_id: ENGINE_USER_ID.to_string(),
        }
    }

    pub fn with_remove_reason(mut self, reason: Option<RemoveReason>) -> Self {
        self.remove_reason = reason;
        self
    }

    pub fn with_condense_strategy(mut self, strategy: Option<CondenseStrategy>) -> Self {
        self.condense_strategy = strategy;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

/// Which signal produced a final annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationSource {
    LearnedExact,
    LearnedSimilar,
    DuplicateDetector,
    HeuristicRules,
    CriticalSafety,
    CombinedSignals,
}

impl ExplanationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LearnedExact => "learned_exact",
            Self::LearnedSimilar => "learned_similar",
            Self::DuplicateDetector => "duplicate_detector",
            Self::HeuristicRules => "heuristic_rules",
            Self::CriticalSafety => "critical_safety",
            Self::CombinedSignals => "combined_signals",
        }
    }
}

/// Auditable explanation attached to every annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelExplanation {
    pub source: ExplanationSource,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    pub reason: String,
    #[serde(default)]
    pub signals: Vec<String>,
}

impl ModelExplanation {
    pub fn new(source: ExplanationSource, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            source,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            signals: Vec::new(),
        }
    }

    pub fn with_signals(mut self, signals: Vec<String>) -> Self {
        self.signals = signals;
        self
    }
}
