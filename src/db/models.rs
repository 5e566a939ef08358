use chrono::{DateTime, Utc};

/// A chunk row as stored, shared by vector and keyword results.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub file_path: String,
    pub function_name: String,
    pub language: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
}

#[derive(Debug)]
pub struct VectorMatch {
    pub chunk: StoredChunk,
    /// Cosine distance; lower is closer.
    pub distance: f64,
}

#[derive(Debug)]
pub struct KeywordMatch {
    pub chunk: StoredChunk,
    /// Negated bm25; higher is better.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexRun {
    pub root: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files: usize,
    pub functions: usize,
    pub edges: usize,
    pub chunks: usize,
    pub vector_ok: bool,
    pub keyword_ok: bool,
}
