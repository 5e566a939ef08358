//! Hybrid retrieval: semantic and lexical index services fused by
//! Reciprocal Rank Fusion into one rendered context string.
pub mod fusion;
pub mod hybrid;
pub mod sqlite;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedder::EmbedderError;
use crate::indexer::CodeChunk;

pub use fusion::{RRF_K, fuse, rrf_contribution};
pub use hybrid::HybridRetriever;
pub use sqlite::{SqliteKeywordIndex, SqliteVectorIndex};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("{chunks} chunks but {embeddings} embeddings")]
    LengthMismatch { chunks: usize, embeddings: usize },
}

/// Semantic index. `query` returns results best match first.
pub trait VectorIndex: Send + Sync {
    /// Writes chunks keyed by id; a second write with the same id overwrites.
    fn upsert(&self, chunks: &[CodeChunk]) -> Result<usize, IndexError>;

    fn query(&self, text: &str, k: usize) -> Result<Vec<VectorHit>, IndexError>;
}

/// Lexical index. `build_index` replaces any prior contents in full.
pub trait KeywordIndex: Send + Sync {
    fn build_index(&self, chunks: &[IndexedChunk]) -> Result<usize, IndexError>;

    fn search(&self, text: &str, k: usize) -> Result<Vec<KeywordHit>, IndexError>;
}

/// Fields of a [`CodeChunk`] the keyword index stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub id: String,
    pub text: String,
    pub file_path: String,
    pub function_name: String,
    pub language: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl From<&CodeChunk> for IndexedChunk {
    fn from(chunk: &CodeChunk) -> Self {
        Self {
            id: chunk.id.clone(),
            text: chunk.text.clone(),
            file_path: chunk.file_path.clone(),
            function_name: chunk.metadata.function_name.clone(),
            language: chunk.language.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
        }
    }
}

/// Optional metadata attached to an index hit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitMetadata {
    pub id: Option<String>,
    pub file_path: Option<String>,
    pub function_name: Option<String>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub text: String,
    pub metadata: HitMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordHit {
    pub id: String,
    pub text: String,
    pub metadata: HitMetadata,
    pub score: f64,
}

/// Which ranked list(s) a fused result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Vector,
    Keyword,
    Both,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Vector => "vector",
            Source::Keyword => "keyword",
            Source::Both => "both",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fused retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub file_path: Option<String>,
    pub function_name: Option<String>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub source: Source,
    /// Sum of RRF contributions.
    pub score: f64,
}
