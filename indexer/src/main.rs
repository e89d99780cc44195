use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use esa_core::analysis::Analyzer;
use esa_core::forward::{BuildStats, ForwardIndexBuilder};
use esa_core::invert::{IndexInverter, InversionReport};
use esa_core::persist::InvertedIndexReader;
use esa_core::weighting::WeightingScheme;
use esa_core::EsaConfig;
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One concept of the input corpus. Either raw `text`, analysed here, or
/// pre-normalized `tokens` must be present.
#[derive(Debug, Deserialize)]
struct InputConcept {
    title: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tokens: Option<Vec<String>>,
}

#[derive(Parser)]
#[command(name = "esa-indexer")]
#[command(about = "Build forward and inverted indexes for Explicit Semantic Analysis", long_about = None)]
struct Cli {
    /// JSON config file; flags given on the command line take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Default)]
struct ForwardArgs {
    /// Minimum number of relevant terms a concept needs (exclusive)
    #[arg(long)]
    min_terms_per_document: Option<usize>,
    /// Snowball stemmer language for raw text input
    #[arg(long)]
    language: Option<String>,
}

#[derive(Args, Default)]
struct InvertArgs {
    /// Terms in fewer concepts are dropped
    #[arg(long, allow_negative_numbers = true)]
    min_document_frequency: Option<i64>,
    /// Terms in at least this fraction of concepts are dropped, in [0, 1]
    #[arg(long)]
    max_corpus_distribution: Option<f64>,
    /// Use smoothed IDF = ln(1 + N/df) instead of ln(N/df)
    #[arg(long, default_value_t = false)]
    smoothed_idf: bool,
    /// Number of extraction threads
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the forward index from JSON/JSONL files or a directory of them
    Forward {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        forward: ForwardArgs,
    },
    /// Invert a forward index into the term -> concept vector store
    Invert {
        #[arg(long)]
        forward: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        invert: InvertArgs,
    },
    /// Run both stages
    Build {
        #[arg(long)]
        input: PathBuf,
        /// Forward index directory
        #[arg(long)]
        forward: PathBuf,
        /// Inverted index directory
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        forward_args: ForwardArgs,
        #[command(flatten)]
        invert: InvertArgs,
    },
    /// Print the highest weighted concepts of a term
    Lookup {
        #[arg(long)]
        index: PathBuf,
        #[arg(long)]
        term: String,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EsaConfig::from_json_file(path)?,
        None => EsaConfig::default(),
    };

    match cli.command {
        Commands::Forward { input, output, forward } => {
            apply_forward_args(&mut config, &forward);
            config.validate()?;
            build_forward(&input, &output, &config)?;
        }
        Commands::Invert { forward, output, invert } => {
            apply_invert_args(&mut config, &invert);
            let report = invert_index(&forward, &output, &config)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Build { input, forward, output, forward_args, invert } => {
            apply_forward_args(&mut config, &forward_args);
            apply_invert_args(&mut config, &invert);
            // Reject bad thresholds before the long forward stage starts.
            let inverter = IndexInverter::from_config(&config)?;
            build_forward(&input, &forward, &config)?;
            let weighting = WeightingScheme::new(&config.weighting);
            let report = inverter.invert_dir(&forward, &output, weighting)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Lookup { index, term, top } => lookup(&index, &term, top)?,
    }
    Ok(())
}

fn apply_forward_args(config: &mut EsaConfig, args: &ForwardArgs) {
    if let Some(n) = args.min_terms_per_document {
        config.forward.min_terms_per_document = n;
    }
    if let Some(language) = &args.language {
        config.forward.language = language.clone();
    }
}

fn apply_invert_args(config: &mut EsaConfig, args: &InvertArgs) {
    if let Some(n) = args.min_document_frequency {
        config.vocabulary.min_document_frequency = n;
    }
    if let Some(d) = args.max_corpus_distribution {
        config.vocabulary.max_corpus_distribution = d;
    }
    if args.smoothed_idf {
        config.weighting.smoothed_idf = true;
    }
    if let Some(w) = args.workers {
        config.inversion.workers = w;
    }
}

fn collect_input_files(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }
    Ok(files)
}

fn build_forward(input: &Path, output: &Path, config: &EsaConfig) -> Result<BuildStats> {
    let analyzer = Analyzer::for_language(&config.forward.language)?;
    let files = collect_input_files(input)?;
    let mut builder = ForwardIndexBuilder::initialize(output, &config.forward)?;

    for file in files {
        let is_jsonl = file.extension().and_then(|s| s.to_str()) == Some("jsonl");
        let result = if is_jsonl {
            index_jsonl(&file, &analyzer, &mut builder)
        } else {
            index_json(&file, &analyzer, &mut builder)
        };
        result.with_context(|| format!("reading {}", file.display()))?;
    }

    let stats = builder.finalize()?;
    tracing::info!(admitted = stats.admitted, dropped = stats.dropped, "forward stage complete");
    Ok(stats)
}

fn index_jsonl(file: &Path, analyzer: &Analyzer, builder: &mut ForwardIndexBuilder) -> Result<()> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InputConcept>(&line) {
            Ok(concept) => ingest_concept(concept, analyzer, builder),
            Err(e) => tracing::warn!(file = %file.display(), line = line_no + 1, error = %e, "skipping malformed concept"),
        }
    }
    Ok(())
}

fn index_json(file: &Path, analyzer: &Analyzer, builder: &mut ForwardIndexBuilder) -> Result<()> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    for v in concept_values(json, file) {
        match serde_json::from_value::<InputConcept>(v) {
            Ok(concept) => ingest_concept(concept, analyzer, builder),
            Err(e) => tracing::warn!(file = %file.display(), error = %e, "skipping malformed concept"),
        }
    }
    Ok(())
}

/// A JSON file holds one concept object or an array of them.
fn concept_values(json: serde_json::Value, file: &Path) -> Vec<serde_json::Value> {
    match json {
        serde_json::Value::Array(arr) => arr,
        obj @ serde_json::Value::Object(_) => vec![obj],
        other => {
            tracing::warn!(file = %file.display(), found = %other, "expected a JSON object or array, skipping file");
            Vec::new()
        }
    }
}

fn ingest_concept(concept: InputConcept, analyzer: &Analyzer, builder: &mut ForwardIndexBuilder) {
    let tokens = match (concept.tokens, concept.text) {
        (Some(tokens), _) => tokens,
        (None, Some(text)) => analyzer.analyze(&text),
        (None, None) => {
            tracing::warn!(title = %concept.title, "concept has neither text nor tokens, skipping");
            return;
        }
    };
    builder.add_concept(&concept.title, &tokens);
}

fn invert_index(forward: &Path, output: &Path, config: &EsaConfig) -> Result<InversionReport> {
    let inverter = IndexInverter::from_config(config)?;
    let weighting = WeightingScheme::new(&config.weighting);
    tracing::info!(input = %forward.display(), output = %output.display(), "inverting forward index");
    let report = inverter.invert_dir(forward, output, weighting)?;
    Ok(report)
}

fn lookup(index: &Path, term: &str, top: usize) -> Result<()> {
    let reader = InvertedIndexReader::open(index)?;
    let Some(vector) = reader.get(term)? else {
        bail!("term {term:?} is not in the index");
    };
    println!("{term}: {} of {} concepts", vector.len(), reader.concept_count());
    for posting in vector.top(top) {
        let title = reader.concept_title(posting.concept_id).unwrap_or("?");
        println!("{:>10.4}  {}", posting.weight, title);
    }
    Ok(())
}
