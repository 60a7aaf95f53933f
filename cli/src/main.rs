use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use noteprune_engine::{
    Chunk, DocumentContext, DocumentSuggestions, EngineConfig, Label, LearnedAnnotation,
    LearnedRuleMatcher, SuggestionEngine,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── CLI Definition ──

#[derive(Parser)]
#[command(
    name = "noteprune",
    version,
    about = "Suggest KEEP / CONDENSE / REMOVE for each fragment of a clinical note"
)]
struct Cli {
    /// Log engine decisions to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a note into typed chunks
    Chunk {
        /// Note text file
        note: PathBuf,

        /// Engine configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Chunk a note and suggest a label for every chunk
    Classify(ClassifyArgs),

    /// Show the closest learned annotations for every chunk
    Matches {
        #[command(flatten)]
        args: ClassifyArgs,

        /// Number of matches per chunk
        #[arg(long, default_value_t = 3)]
        top: usize,
    },
}

#[derive(Args)]
struct ClassifyArgs {
    /// Note text file
    note: PathBuf,

    /// Confirmed annotations to learn from (JSON array)
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Note type of the document, e.g. "progress"
    #[arg(long)]
    note_type: Option<String>,

    /// Service that wrote the document, e.g. "cardiology"
    #[arg(long)]
    service: Option<String>,

    /// Engine configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl ClassifyArgs {
    fn context(&self) -> DocumentContext {
        DocumentContext {
            note_type: self.note_type.clone(),
            service: self.service.clone(),
        }
    }
}

// ── Output ──

#[derive(Serialize)]
struct ClassifyOutput {
    chunks: Vec<Chunk>,
    #[serde(flatten)]
    suggestions: DocumentSuggestions,
}

#[derive(Serialize)]
struct ChunkMatches {
    chunk_id: String,
    matches: Vec<MatchSummary>,
}

#[derive(Serialize)]
struct MatchSummary {
    corpus_index: usize,
    learned_chunk_id: String,
    label: Label,
    similarity: f32,
    score: f32,
    exact: bool,
    accepted: bool,
}

// ── Main ──

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = match cli.command {
        Commands::Chunk { note, config } => {
            let engine = SuggestionEngine::with_config(load_config(config.as_deref())?);
            let chunks = engine.chunk_document(&read_note(&note)?);
            info!("{} chunks from {}", chunks.len(), note.display());
            serde_json::to_string_pretty(&chunks)?
        }
        Commands::Classify(args) => serde_json::to_string_pretty(&classify(&args)?)?,
        Commands::Matches { args, top } => serde_json::to_string_pretty(&matches(&args, top)?)?,
    };

    println!("{output}");
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "noteprune_engine=debug,noteprune=info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn classify(args: &ClassifyArgs) -> anyhow::Result<ClassifyOutput> {
    let engine = SuggestionEngine::with_config(load_config(args.config.as_deref())?);
    let corpus = load_corpus(args.corpus.as_deref())?;
    let (chunks, suggestions) =
        engine.process_note(&read_note(&args.note)?, &corpus, &args.context());
    Ok(ClassifyOutput {
        chunks,
        suggestions,
    })
}

fn matches(args: &ClassifyArgs, top: usize) -> anyhow::Result<Vec<ChunkMatches>> {
    let config = load_config(args.config.as_deref())?;
    let accept_threshold = config.learned.accept_threshold;
    let matcher = LearnedRuleMatcher::with_config(config.learned.clone());
    let engine = SuggestionEngine::with_config(config);

    let corpus = load_corpus(args.corpus.as_deref())?;
    let context = args.context();
    let chunks = engine.chunk_document(&read_note(&args.note)?);

    Ok(chunks
        .iter()
        .map(|chunk| ChunkMatches {
            chunk_id: chunk.id.clone(),
            matches: matcher
                .ranked_matches(chunk, &corpus, &context, top)
                .into_iter()
                .map(|m| MatchSummary {
                    corpus_index: m.index,
                    learned_chunk_id: m.entry.chunk_id.clone(),
                    label: m.entry.label,
                    similarity: m.similarity,
                    score: m.score,
                    exact: m.exact,
                    accepted: m.exact || m.score >= accept_threshold,
                })
                .collect(),
        })
        .collect())
}

fn read_note(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read note {}", path.display()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn load_corpus(path: Option<&Path>) -> anyhow::Result<Vec<LearnedAnnotation>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read corpus {}", path.display()))?;
    let corpus: Vec<LearnedAnnotation> = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse corpus {}", path.display()))?;
    info!("Loaded {} learned annotations", corpus.len());
    Ok(corpus)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const NOTE: &str = "ASSESSMENT AND PLAN\nPatient is on warfarin 5mg daily\n";

    fn args(dir: &TempDir, corpus: Option<PathBuf>) -> ClassifyArgs {
        let note = dir.path().join("note.txt");
        fs::write(&note, NOTE).unwrap();
        ClassifyArgs {
            note,
            corpus,
            note_type: Some("progress".to_string()),
            service: None,
            config: None,
        }
    }

    #[test]
    fn test_classify_note_file() {
        let tmp = TempDir::new().unwrap();
        let output = classify(&args(&tmp, None)).unwrap();

        assert_eq!(output.chunks.len(), 2);
        assert_eq!(output.suggestions.label_of("chunk-0"), Some(Label::Keep));
        assert_eq!(output.suggestions.label_of("chunk-1"), Some(Label::Keep));

        let json = serde_json::to_value(&output).unwrap();
        assert!(json["annotations"]["chunk-1"].is_object());
        assert_eq!(json["chunks"][0]["type"], "section_header");
    }

    #[test]
    fn test_matches_against_corpus() {
        let tmp = TempDir::new().unwrap();
        let corpus_path = tmp.path().join("corpus.json");
        fs::write(
            &corpus_path,
            r#"[{
                "chunk_id": "old-1",
                "raw_text": "patient is on warfarin 5mg daily",
                "section_type": "medication_list",
                "label": "KEEP",
                "scope": "global",
                "timestamp": "2026-10-01T08:00:00Z",
                "user_id": "dr-lee"
            }]"#,
        )
        .unwrap();

        let result = matches(&args(&tmp, Some(corpus_path)), 3).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result[0].matches.is_empty());
        assert_eq!(result[1].matches.len(), 1);
        assert!(result[1].matches[0].exact);
        assert!(result[1].matches[0].accepted);
    }

    #[test]
    fn test_missing_files_are_reported() {
        let err = read_note(Path::new("/nonexistent/note.txt")).unwrap_err();
        assert!(err.to_string().contains("failed to read note"));

        let tmp = TempDir::new().unwrap();
        let bad = tmp.path().join("corpus.json");
        fs::write(&bad, "not json").unwrap();
        let err = load_corpus(Some(&bad)).unwrap_err();
        assert!(err.to_string().contains("failed to parse corpus"));

        assert!(load_corpus(None).unwrap().is_empty());
    }
}
