use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use super::call_graph::CallGraphBuilder;
use super::chunker::{ChunkEnricher, CodeChunk};
use super::extractor::{SymbolExtractor, extract_repository};
use crate::db::Db;
use crate::db::models::IndexRun;
use crate::retrieval::{IndexError, IndexedChunk, KeywordIndex, SqliteVectorIndex, VectorIndex};

/// Outcome of one [`Indexer::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub root: String,
    pub files: usize,
    pub functions: usize,
    pub edges: usize,
    pub chunks: usize,
    /// Chunks written to the vector index, `None` if the write failed.
    pub vector_written: Option<usize>,
    pub keyword_written: Option<usize>,
    pub errors: Vec<String>,
}

/// Extract -> graph -> chunk -> write both indexes.
pub struct Indexer {
    db: Arc<TokioMutex<Db>>,
    extractor: Arc<dyn SymbolExtractor>,
    vector: Arc<SqliteVectorIndex>,
    keyword: Arc<dyn KeywordIndex>,
    exclude_dirs: Vec<String>,
}

impl Indexer {
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        extractor: Arc<dyn SymbolExtractor>,
        vector: Arc<SqliteVectorIndex>,
        keyword: Arc<dyn KeywordIndex>,
    ) -> Self {
        Self {
            db,
            extractor,
            vector,
            keyword,
            exclude_dirs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_exclude_dirs(mut self, exclude_dirs: Vec<String>) -> Self {
        self.exclude_dirs = exclude_dirs;
        self
    }

    /// Full rebuild of both indexes from the files under `root`.
    ///
    /// Extraction and graph errors abort the run. A failed index write is
    /// logged and recorded in the report; the other write still completes.
    pub async fn run(&self, root: &Path) -> Result<IndexReport> {
        let started_at = Utc::now();
        let root_display = root.display().to_string();

        let files = {
            let extractor = Arc::clone(&self.extractor);
            let exclude_dirs = self.exclude_dirs.clone();
            let root = root.to_path_buf();
            tokio::task::spawn_blocking(move || extract_repository(&*extractor, &root, &exclude_dirs))
                .await
                .context("extraction task failed")?
                .with_context(|| format!("failed to extract {root_display}"))?
        };

        let graph = CallGraphBuilder::new()
            .build(&files)
            .context("failed to build call graph")?;
        let functions: usize = files.iter().map(|f| f.functions.len()).sum();
        let edges = graph.edge_count();
        debug!(files = files.len(), functions, edges, "Chunking functions");

        let chunks = Arc::new(ChunkEnricher.chunk(&files, &graph));
        let indexed: Vec<IndexedChunk> = chunks.iter().map(IndexedChunk::from).collect();

        let vector_task = {
            let vector = Arc::clone(&self.vector);
            let chunks = Arc::clone(&chunks);
            tokio::task::spawn_blocking(move || write_vectors(&vector, &chunks))
        };
        let keyword_task = {
            let keyword = Arc::clone(&self.keyword);
            tokio::task::spawn_blocking(move || keyword.build_index(&indexed))
        };
        let (vector_result, keyword_result) = tokio::join!(vector_task, keyword_task);

        let mut errors = Vec::new();
        let vector_written = settle("vector", vector_result, &mut errors);
        let keyword_written = settle("keyword", keyword_result, &mut errors);

        let report = IndexReport {
            root: root_display,
            files: files.len(),
            functions,
            edges,
            chunks: chunks.len(),
            vector_written,
            keyword_written,
            errors,
        };

        let run = IndexRun {
            root: report.root.clone(),
            started_at,
            finished_at: Utc::now(),
            files: report.files,
            functions: report.functions,
            edges: report.edges,
            chunks: report.chunks,
            vector_ok: report.vector_written.is_some(),
            keyword_ok: report.keyword_written.is_some(),
        };
        self.db
            .lock()
            .await
            .record_run(&run)
            .context("failed to record index run")?;

        info!(
            chunks = report.chunks,
            vector_ok = run.vector_ok,
            keyword_ok = run.keyword_ok,
            "Indexing finished"
        );
        Ok(report)
    }
}

fn write_vectors(vector: &SqliteVectorIndex, chunks: &[CodeChunk]) -> Result<usize, IndexError> {
    let written = vector.upsert(chunks)?;
    let live: HashSet<String> = chunks.iter().map(|c| c.id.clone()).collect();
    let removed = vector.remove_stale(&live)?;
    debug!(written, removed, "Vector index updated");
    Ok(written)
}

fn settle(
    label: &str,
    result: Result<Result<usize, IndexError>, JoinError>,
    errors: &mut Vec<String>,
) -> Option<usize> {
    let message = match result {
        Ok(Ok(written)) => return Some(written),
        Ok(Err(e)) => e.to_string(),
        Err(e) => format!("task failed: {e}"),
    };
    warn!(index = label, error = %message, "Index write failed");
    errors.push(format!("{label} index: {message}"));
    None
}
