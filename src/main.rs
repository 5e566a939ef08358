use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::Mutex as TokioMutex;
use tracing_subscriber::EnvFilter;

use reviewrag::budget::{BudgetAllocator, CharEstimator, HfTokenEstimator, TokenEstimator};
use reviewrag::config::Config;
use reviewrag::db::Db;
use reviewrag::embedder::{Embedder, HashingEmbedder};
use reviewrag::indexer::{CallGraphBuilder, Indexer, TreeSitterExtractor, extract_repository};
use reviewrag::retrieval::hybrid::render;
use reviewrag::retrieval::{HybridRetriever, SqliteKeywordIndex, SqliteVectorIndex};
use reviewrag::review::{
    build_user_prompt, check_limits, oversized_message, parse_unified_diff, retrieval_query,
    should_skip_review, system_preamble,
};

/// Longest query derived from a diff when `--query` is not given.
const DERIVED_QUERY_CHARS: usize = 2000;

#[derive(Parser)]
#[command(name = "reviewrag", version, about = "Code intelligence for automated review")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = "")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, build the call graph, chunk, and write both indexes
    Index { dir: PathBuf },
    /// Print the call graph of a repository as JSON
    Graph { dir: PathBuf },
    /// Retrieve context for a query, optionally budgeted against a diff
    Context {
        #[arg(long)]
        query: Option<String>,
        /// Unified diff to budget against
        #[arg(long)]
        diff: Option<PathBuf>,
        /// Change title used in the assembled prompt
        #[arg(long, default_value = "Untitled change")]
        title: String,
    },
    /// Parse a unified diff and evaluate the change-size limits
    CheckDiff { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Command::Index { dir } => index(&config, &dir).await,
        Command::Graph { dir } => graph(&config, dir).await,
        Command::Context { query, diff, title } => {
            context(&config, query, diff.as_deref(), &title).await
        }
        Command::CheckDiff { file } => check_diff(&config, &file),
    }
}

fn open_db(config: &Config) -> Result<Arc<TokioMutex<Db>>> {
    if let Some(parent) = Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let db = Db::open(&config.db_path, config.model.dimensions)
        .with_context(|| format!("failed to open database: {}", config.db_path))?;
    Ok(Arc::new(TokioMutex::new(db)))
}

fn embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let embedder = HashingEmbedder::new(config.model.dimensions).context("invalid model.dimensions")?;
    Ok(Arc::new(embedder))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn index(config: &Config, dir: &Path) -> Result<()> {
    let db = open_db(config)?;
    let vector = Arc::new(SqliteVectorIndex::new(db.clone(), embedder(config)?));
    let keyword = Arc::new(SqliteKeywordIndex::new(
        db.clone(),
        config.retrieval.max_query_terms,
    ));
    let extractor = Arc::new(TreeSitterExtractor::new()?);

    let report = Indexer::new(db, extractor, vector, keyword)
        .with_exclude_dirs(config.exclude_dirs.clone())
        .run(dir)
        .await?;
    print_json(&report)
}

async fn graph(config: &Config, dir: PathBuf) -> Result<()> {
    let exclude_dirs = config.exclude_dirs.clone();
    let files = tokio::task::spawn_blocking(move || -> Result<_> {
        let extractor = TreeSitterExtractor::new()?;
        Ok(extract_repository(&extractor, &dir, &exclude_dirs)?)
    })
    .await??;

    let graph = CallGraphBuilder::new().build(&files)?;
    print_json(&graph)
}

async fn context(
    config: &Config,
    query: Option<String>,
    diff_path: Option<&Path>,
    title: &str,
) -> Result<()> {
    let diff = match diff_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read diff: {}", path.display()))?;
            Some(parse_unified_diff(&text))
        }
        None => None,
    };

    let query = match (query, &diff) {
        (Some(q), _) => q,
        (None, Some(d)) => retrieval_query(&d.significant_changes(), DERIVED_QUERY_CHARS),
        (None, None) => anyhow::bail!("either --query or --diff is required"),
    };

    let db = open_db(config)?;
    let vector = Arc::new(SqliteVectorIndex::new(db.clone(), embedder(config)?));
    let keyword = Arc::new(SqliteKeywordIndex::new(db, config.retrieval.max_query_terms));
    let retriever = HybridRetriever::new(vector, keyword)
        .with_limits(config.retrieval.vector_k, config.retrieval.keyword_k);

    let (vector_k, keyword_k) = retriever.limits();
    let chunks = retriever.retrieve_chunks(&query, vector_k, keyword_k).await;
    let rendered = render(&chunks);

    let Some(diff) = diff else {
        return print_json(&json!({
            "query": query,
            "chunks": chunks,
            "context": rendered,
        }));
    };

    let estimator: Arc<dyn TokenEstimator> = match &config.budget.tokenizer_path {
        Some(path) => Arc::new(HfTokenEstimator::from_file(Path::new(path))?),
        None => Arc::new(CharEstimator),
    };
    let allocator = BudgetAllocator::with_estimator(config.budget.limits, estimator)?;
    let preamble = system_preamble();
    let preamble_tokens = allocator.estimate(preamble);
    if preamble_tokens > config.budget.limits.preamble_tokens {
        tracing::warn!(
            preamble_tokens,
            reserved = config.budget.limits.preamble_tokens,
            "System preamble exceeds its reservation"
        );
    }

    let inputs = allocator.allocate(&diff.content, &rendered);
    let prompt = build_user_prompt(&diff, title, &inputs);
    print_json(&json!({
        "query": query,
        "chunks": chunks,
        "allocation": inputs.allocation,
        "change_tokens_removed": inputs.change_tokens_removed,
        "context_tokens_removed": inputs.context_tokens_removed,
        "system": preamble,
        "prompt": prompt,
    }))
}

fn check_diff(config: &Config, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read diff: {}", file.display()))?;
    let diff = parse_unified_diff(&text);
    let check = check_limits(&diff, &config.review);
    let skip = should_skip_review(&diff, &config.review);
    let significant: Vec<_> = diff
        .significant_changes()
        .files
        .into_iter()
        .map(|f| f.filename)
        .collect();

    print_json(&json!({
        "files": diff.files,
        "significant_files": significant,
        "check": check,
        "skip_review": skip,
        "message": (!check.passed).then(|| oversized_message(&check)),
    }))
}
