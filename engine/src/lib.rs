//! # Clinical Note Suggestion Engine
//!
//! This crate proposes a disposition for every fragment of a clinical note.
//! It provides:
//!
//! - **Chunking**: Typed, offset-addressed fragments cut at section headers
//!   and blank lines, with critical-content flags and parser suggestions
//! - **Learned Matching**: Similarity search over human-confirmed annotations,
//!   weighted by scope
//! - **Duplicate Detection**: Passages repeated within the same note
//! - **Heuristic Rules and Fusion**: Ordered pattern rules combined with the
//!   parser suggestion into one label, under a critical-content safety override
//! - **Field Extraction**: Vitals, labs, medications, allergies, code status
//!   and dates pulled out alongside the labels
//!
//! Every operation is synchronous and pure over its inputs. The learned
//! corpus is supplied by the caller on each call.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Chunking                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Note text ──► TextChunker ──► Chunk { type, critical, hint }   │
//! │                    │                                            │
//! │                    ├── detect_critical                          │
//! │                    └── find_duplicates                          │
//! └─────────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Classification                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Chunk ──► LearnedRuleMatcher ──► (accepted) ──────────┐        │
//! │    │                                                   │        │
//! │    ├──► duplicate set ──► REMOVE duplicate_data ───────┤        │
//! │    │                                                   ▼        │
//! │    └──► heuristic::classify ──► fusion::fuse ──► safety override│
//! │                                                        │        │
//! │  FieldExtractor ──► ExtractedField                     ▼        │
//! │                                         DocumentSuggestions     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

// Core modules
pub mod config;
pub mod error;
pub mod label;
pub mod patterns;

// Chunking modules
pub mod chunker;
pub mod critical;
pub mod duplicate;

// Classification modules
pub mod extraction;
pub mod fusion;
pub mod heuristic;
pub mod learned;
pub mod similarity;
pub mod suggest;

// Core re-exports
pub use config::{ChunkerConfig, DuplicateConfig, EngineConfig, ExtractionConfig, MatcherConfig};
pub use error::{EngineError, Result};
pub use label::{
    Annotation, CondenseStrategy, ExplanationSource, Label, ModelExplanation, RemoveReason, Scope,
};

// Chunking re-exports
pub use chunker::{Chunk, ChunkType, Suggestion, TextChunker, chunk_document};
pub use critical::{CriticalCategory, detect_critical};
pub use duplicate::find_duplicates;

// Classification re-exports
pub use extraction::{ExtractedField, FieldCategory, FieldExtractor};
pub use fusion::{Decision, Signal, SignalSource};
pub use heuristic::HeuristicCandidate;
pub use learned::{DocumentContext, LearnedAnnotation, LearnedMatch, LearnedRuleMatcher};
pub use suggest::{DocumentSuggestions, SuggestionEngine, SuggestionStats, classify_document};
