// Docket CLI - headless evidence-index matching

mod exit_codes;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use docket_engine::merge::{merge, MergeStrategy};
use docket_engine::model::Reference;
use docket_engine::pipeline::{backend_for, BatchMatchPipeline};
use docket_engine::series::{find_path_pattern, generate_paths_for_series, SeriesDetector};
use docket_engine::MatchConfig;
use docket_io::mappings::{decode, encode, MappingFormat};
use docket_io::store::MatchStore;

use exit_codes::{EXIT_IMPORT, EXIT_INVALID_CONFIG, EXIT_RUNTIME, EXIT_USAGE};

pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
        }
    }

    fn report(&self) {
        eprintln!("error: {}", self.message);
        if let Some(hint) = &self.hint {
            eprintln!("hint: {hint}");
        }
    }
}

#[derive(Parser)]
#[command(name = "docket")]
#[command(about = "Evidence-index matching (headless)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score references against the corpus and print high-confidence candidates
    #[command(after_help = "\
Examples:
  docket automatch references.json corpus.txt
  docket automatch references.json corpus.txt --threshold 0.9 --json
  docket automatch references.json corpus.txt --config bundle.toml")]
    Automatch {
        /// JSON array of references
        references: PathBuf,

        /// Newline-delimited list of corpus paths
        corpus: PathBuf,

        /// Minimum score for a candidate
        #[arg(long, default_value_t = 0.8)]
        threshold: f64,

        /// Score batches on a worker thread
        #[arg(long)]
        threaded: bool,

        /// References per batch
        #[arg(long, default_value_t = docket_engine::pipeline::DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Take threshold, backend and batch size from a TOML config instead
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output candidates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Detect numbered series and suggest templated paths
    #[command(after_help = "\
Examples:
  docket series references.json corpus.txt
  docket series references.json corpus.txt --json")]
    Series {
        /// JSON array of references
        references: PathBuf,

        /// Newline-delimited list of corpus paths
        corpus: PathBuf,

        /// Output series and suggestions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a session's matches from the store
    #[command(after_help = "\
Examples:
  docket export session.docket --session hearing-2026
  docket export session.docket --session hearing-2026 --format json -o out.json")]
    Export {
        /// Path to the session store
        db: PathBuf,

        #[arg(long)]
        session: String,

        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,

        /// Output file (defaults to a generated filename)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Import a mappings file into a stored session
    #[command(after_help = "\
Examples:
  docket import session.docket reviewed.csv --session hearing-2026
  docket import session.docket reviewed.csv --session hearing-2026 --strategy replace")]
    Import {
        /// Path to the session store
        db: PathBuf,

        /// Mappings file (.csv, .tsv or .json)
        file: PathBuf,

        /// Session to merge into (a new id is generated when omitted)
        #[arg(long)]
        session: Option<String>,

        #[arg(long, value_enum, default_value_t = Strategy::Skip)]
        strategy: Strategy,
    },

    /// Validate a match config without running
    Validate {
        /// Path to the .toml config file
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Tsv,
    Json,
}

impl From<Format> for MappingFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => MappingFormat::Csv,
            Format::Tsv => MappingFormat::Tsv,
            Format::Json => MappingFormat::Json,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Skip,
    Replace,
}

impl From<Strategy> for MergeStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Skip => MergeStrategy::Skip,
            Strategy::Replace => MergeStrategy::Replace,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            err.report();
            ExitCode::from(err.code)
        }
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Automatch {
            references,
            corpus,
            threshold,
            threaded,
            batch_size,
            config,
            json,
        } => cmd_automatch(references, corpus, threshold, threaded, batch_size, config, json),
        Commands::Series {
            references,
            corpus,
            json,
        } => cmd_series(references, corpus, json),
        Commands::Export {
            db,
            session,
            format,
            output,
        } => cmd_export(db, &session, format.into(), output),
        Commands::Import {
            db,
            file,
            session,
            strategy,
        } => cmd_import(db, file, session, strategy.into()),
        Commands::Validate { config } => cmd_validate(config),
    }
}

// -------------------------------------------------------------------------
// Input loading
// -------------------------------------------------------------------------

fn read_to_string(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|e| CliError::new(EXIT_RUNTIME, format!("cannot read {}: {e}", path.display())))
}

fn load_references(path: &Path) -> Result<Vec<Reference>, CliError> {
    let content = read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        CliError::new(
            EXIT_USAGE,
            format!("{}: expected a JSON array of references: {e}", path.display()),
        )
    })
}

fn load_corpus(path: &Path) -> Result<Vec<String>, CliError> {
    let content = read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

// -------------------------------------------------------------------------
// automatch
// -------------------------------------------------------------------------

fn cmd_automatch(
    references_path: PathBuf,
    corpus_path: PathBuf,
    threshold: f64,
    threaded: bool,
    batch_size: usize,
    config_path: Option<PathBuf>,
    json_output: bool,
) -> Result<(), CliError> {
    let references = load_references(&references_path)?;
    let corpus = load_corpus(&corpus_path)?;

    let (threshold, backend_kind, batch_size) = match config_path {
        Some(path) => {
            let config = MatchConfig::from_toml(&read_to_string(&path)?)
                .map_err(|e| CliError::new(EXIT_INVALID_CONFIG, e.to_string()))?;
            (config.threshold, config.backend, config.batch_size)
        }
        None => {
            let kind = if threaded {
                docket_engine::config::BackendKind::Threaded
            } else {
                docket_engine::config::BackendKind::Inline
            };
            (threshold, kind, batch_size)
        }
    };

    let backend = backend_for(backend_kind, &corpus, &BTreeSet::new());
    let pipeline = BatchMatchPipeline::with_batch_size(backend, batch_size);
    let candidates = pipeline.find_high_confidence_matches(threshold, &references, |p| {
        eprintln!(
            "  scored {}/{} references, {} candidates",
            p.processed, p.total, p.found
        );
    });

    if candidates.is_empty() {
        println!("no matches found above the given threshold");
        return Ok(());
    }

    if json_output {
        let out = serde_json::to_string_pretty(&candidates)
            .map_err(|e| CliError::new(EXIT_RUNTIME, e.to_string()))?;
        println!("{out}");
    } else {
        for candidate in &candidates {
            println!(
                "{:>4.0}%  {}  ->  {}",
                candidate.score * 100.0,
                candidate.reference,
                candidate.path
            );
        }
        println!("{} candidate(s) at threshold {threshold}", candidates.len());
    }
    Ok(())
}

// -------------------------------------------------------------------------
// series
// -------------------------------------------------------------------------

fn cmd_series(
    references_path: PathBuf,
    corpus_path: PathBuf,
    json_output: bool,
) -> Result<(), CliError> {
    let references = load_references(&references_path)?;
    let corpus = load_corpus(&corpus_path)?;

    let descriptions: Vec<String> = references.iter().map(|r| r.description.clone()).collect();
    let detected = SeriesDetector::new().detect(&descriptions);

    if json_output {
        let mut out = Vec::new();
        for (key, series) in &detected {
            let template = find_path_pattern(series, &corpus);
            let suggestions = template
                .as_ref()
                .map(|t| generate_paths_for_series(series, t))
                .unwrap_or_default();
            out.push(serde_json::json!({
                "key": key,
                "items": series.items,
                "template": template.as_ref().map(|t| t.template.clone()),
                "suggestions": suggestions
                    .iter()
                    .map(|s| serde_json::json!({
                        "reference": s.reference,
                        "path": s.suggested_path,
                        "confidence": s.confidence,
                    }))
                    .collect::<Vec<_>>(),
            }));
        }
        let rendered = serde_json::to_string_pretty(&out)
            .map_err(|e| CliError::new(EXIT_RUNTIME, e.to_string()))?;
        println!("{rendered}");
        return Ok(());
    }

    if detected.is_empty() {
        println!("no series detected");
        return Ok(());
    }
    for (key, series) in &detected {
        println!("{key}  ({} items)", series.items.len());
        match find_path_pattern(series, &corpus) {
            Some(template) => {
                println!("  template: {}", template.template);
                for suggestion in generate_paths_for_series(series, &template) {
                    println!("    {}  ->  {}", suggestion.reference, suggestion.suggested_path);
                }
            }
            None => println!("  no path template inferred"),
        }
    }
    Ok(())
}

// -------------------------------------------------------------------------
// export / import
// -------------------------------------------------------------------------

fn open_store(path: &Path) -> Result<MatchStore, CliError> {
    MatchStore::open(path)
        .map_err(|e| CliError::new(EXIT_RUNTIME, format!("{}: {e}", path.display())))
}

fn cmd_export(
    db: PathBuf,
    session: &str,
    format: MappingFormat,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let store = open_store(&db)?;
    let matches = store
        .load_matches(session)
        .map_err(|e| CliError::new(EXIT_RUNTIME, e.to_string()))?;

    let payload =
        encode(&matches, format).map_err(|e| CliError::new(EXIT_RUNTIME, e.to_string()))?;
    let target = output.unwrap_or_else(|| PathBuf::from(&payload.filename));
    std::fs::write(&target, payload.content).map_err(|e| {
        CliError::new(EXIT_RUNTIME, format!("cannot write {}: {e}", target.display()))
    })?;
    eprintln!("Wrote {} mapping(s) to {}", matches.len(), target.display());
    Ok(())
}

fn cmd_import(
    db: PathBuf,
    file: PathBuf,
    session: Option<String>,
    strategy: MergeStrategy,
) -> Result<(), CliError> {
    let format = file
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(MappingFormat::from_extension)
        .ok_or_else(|| {
            let mut err = CliError::new(
                EXIT_USAGE,
                format!("unsupported mappings format: {}", file.display()),
            );
            err.hint = Some("expected a .csv, .tsv or .json file".into());
            err
        })?;

    let content = read_to_string(&file)?;
    let decoded = decode(&content, format)
        .map_err(|e| CliError::new(EXIT_IMPORT, e.to_string()))?;
    for error in &decoded.errors {
        eprintln!("  line {}: {}", error.line, error.error);
    }

    let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let store = open_store(&db)?;
    let state = store
        .load_session(&session)
        .map_err(|e| CliError::new(EXIT_RUNTIME, e.to_string()))?
        .unwrap_or_default();

    let (state, report) = merge(state, decoded.mappings, strategy);

    store
        .save_matches(&session, &state.matches)
        .map_err(|e| CliError::new(EXIT_RUNTIME, e.to_string()))?;
    store.autosave_session(&session, &state);

    for conflict in &report.errors {
        eprintln!("  conflict: {} ({})", conflict.reference, conflict.error);
    }
    println!(
        "session {session}: {} added, {} skipped, {} replaced, {} conflict(s), {} rejected record(s)",
        report.added,
        report.skipped,
        report.replaced,
        report.errors.len(),
        decoded.errors.len()
    );
    Ok(())
}

// -------------------------------------------------------------------------
// validate
// -------------------------------------------------------------------------

fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = MatchConfig::from_toml(&read_to_string(&config_path)?)
        .map_err(|e| CliError::new(EXIT_INVALID_CONFIG, e.to_string()))?;
    println!(
        "{}: ok (threshold {}, batch size {}, backend {})",
        config.name, config.threshold, config.batch_size, config.backend
    );
    Ok(())
}
