//! [`VectorIndex`] and [`KeywordIndex`] backed by the shared [`Db`].
//!
//! Both adapters take the database lock with `blocking_lock`, so their trait
//! methods must run off the async executor (`spawn_blocking`), which is how
//! the retriever and the indexer call them.
use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;

use super::{HitMetadata, IndexError, IndexedChunk, KeywordHit, KeywordIndex, VectorHit, VectorIndex};
use crate::db::Db;
use crate::db::models::StoredChunk;
use crate::embedder::Embedder;
use crate::indexer::CodeChunk;

fn metadata(chunk: &StoredChunk) -> HitMetadata {
    HitMetadata {
        id: Some(chunk.chunk_id.clone()),
        file_path: Some(chunk.file_path.clone()),
        function_name: Some(chunk.function_name.clone()),
        start_line: Some(chunk.start_line),
        end_line: Some(chunk.end_line),
    }
}

pub struct SqliteVectorIndex {
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
}

impl SqliteVectorIndex {
    pub fn new(db: Arc<TokioMutex<Db>>, embedder: Arc<dyn Embedder>) -> Self {
        Self { db, embedder }
    }

    /// Drops stored chunks that are not in `live`.
    pub fn remove_stale(&self, live: &HashSet<String>) -> Result<usize, IndexError> {
        let mut db = self.db.blocking_lock();
        Ok(db.remove_stale_chunks(live)?)
    }
}

impl VectorIndex for SqliteVectorIndex {
    fn upsert(&self, chunks: &[CodeChunk]) -> Result<usize, IndexError> {
        let texts: Vec<String> = chunks.iter().map(CodeChunk::embedding_text).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let embeddings = self.embedder.embed_batch(&text_refs)?;
        if embeddings.len() != chunks.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        let mut db = self.db.blocking_lock();
        Ok(db.upsert_chunks(chunks, &embeddings)?)
    }

    fn query(&self, text: &str, k: usize) -> Result<Vec<VectorHit>, IndexError> {
        let vector = self.embedder.embed(text)?;
        let matches = {
            let db = self.db.blocking_lock();
            db.vector_search(&vector, k)?
        };

        Ok(matches
            .into_iter()
            .map(|m| VectorHit {
                metadata: metadata(&m.chunk),
                text: m.chunk.content,
            })
            .collect())
    }
}

pub struct SqliteKeywordIndex {
    db: Arc<TokioMutex<Db>>,
    max_query_terms: usize,
}

impl SqliteKeywordIndex {
    pub fn new(db: Arc<TokioMutex<Db>>, max_query_terms: usize) -> Self {
        Self {
            db,
            max_query_terms,
        }
    }
}

impl KeywordIndex for SqliteKeywordIndex {
    fn build_index(&self, chunks: &[IndexedChunk]) -> Result<usize, IndexError> {
        let mut db = self.db.blocking_lock();
        Ok(db.replace_keyword_index(chunks)?)
    }

    fn search(&self, text: &str, k: usize) -> Result<Vec<KeywordHit>, IndexError> {
        let matches = {
            let db = self.db.blocking_lock();
            db.keyword_search(text, k, self.max_query_terms)?
        };

        Ok(matches
            .into_iter()
            .map(|m| KeywordHit {
                id: m.chunk.chunk_id.clone(),
                metadata: metadata(&m.chunk),
                text: m.chunk.content,
                score: m.score,
            })
            .collect())
    }
}
