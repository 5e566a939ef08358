use std::sync::Arc;

use tracing::{info, warn};

use super::fusion::fuse;
use super::{KeywordHit, KeywordIndex, RetrievedChunk, VectorIndex};

const DIVIDER_WIDTH: usize = 40;
const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// Fuses a vector and a keyword index into one ranked, rendered context.
///
/// Never fails: an unavailable vector index degrades to keyword-only search
/// with twice the keyword depth, and a failing keyword index contributes
/// nothing.
pub struct HybridRetriever {
    vector: Arc<dyn VectorIndex>,
    keyword: Arc<dyn KeywordIndex>,
    vector_k: usize,
    keyword_k: usize,
}

impl HybridRetriever {
    pub fn new(vector: Arc<dyn VectorIndex>, keyword: Arc<dyn KeywordIndex>) -> Self {
        Self {
            vector,
            keyword,
            vector_k: 10,
            keyword_k: 10,
        }
    }

    /// Depths used by callers that do not pick their own, such as the CLI.
    #[must_use]
    pub fn with_limits(mut self, vector_k: usize, keyword_k: usize) -> Self {
        self.vector_k = vector_k;
        self.keyword_k = keyword_k;
        self
    }

    /// Configured `(vector_k, keyword_k)`, 10/10 unless set with [`Self::with_limits`].
    pub fn limits(&self) -> (usize, usize) {
        (self.vector_k, self.keyword_k)
    }

    /// Fused results, best first.
    ///
    /// The vector query asks for `vector_k` and the keyword query for
    /// `keyword_k`, concurrently. If the vector query fails the keyword index
    /// is asked again for `keyword_k * 2` and the result is keyword-only.
    pub async fn retrieve_chunks(
        &self,
        query: &str,
        vector_k: usize,
        keyword_k: usize,
    ) -> Vec<RetrievedChunk> {
        let vector = Arc::clone(&self.vector);
        let vector_query = query.to_string();
        let vector_task =
            tokio::task::spawn_blocking(move || vector.query(&vector_query, vector_k));
        let keyword_task = self.keyword_search(query, keyword_k);

        let (vector_result, keyword_result) = tokio::join!(vector_task, keyword_task);

        let (vector_hits, keyword_hits, vector_available) = match vector_result {
            Ok(Ok(hits)) => (hits, keyword_result, true),
            Ok(Err(e)) => {
                warn!(error = %e, "Vector index unavailable, falling back to keyword-only search");
                let widened = self.keyword_search(query, keyword_k.saturating_mul(2)).await;
                (Vec::new(), widened, false)
            }
            Err(e) => {
                warn!(error = %e, "Vector query task failed, falling back to keyword-only search");
                let widened = self.keyword_search(query, keyword_k.saturating_mul(2)).await;
                (Vec::new(), widened, false)
            }
        };

        let fused = fuse(&vector_hits, &keyword_hits);

        info!(
            unique_chunks = fused.len(),
            vector_results = vector_hits.len(),
            keyword_results = keyword_hits.len(),
            vector_available,
            "Hybrid retrieval completed"
        );

        fused
    }

    /// Fused results rendered as one context string; empty when nothing matched.
    pub async fn retrieve(&self, query: &str, vector_k: usize, keyword_k: usize) -> String {
        render(&self.retrieve_chunks(query, vector_k, keyword_k).await)
    }

    /// Keyword hits for `query`, or nothing if the search fails.
    async fn keyword_search(&self, query: &str, k: usize) -> Vec<KeywordHit> {
        let keyword = Arc::clone(&self.keyword);
        let query = query.to_string();
        match tokio::task::spawn_blocking(move || keyword.search(&query, k)).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(error = %e, k, "Keyword search failed");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, k, "Keyword search task failed");
                Vec::new()
            }
        }
    }
}

/// Header line, divider, then text for each chunk, in the given order.
pub fn render(chunks: &[RetrievedChunk]) -> String {
    let divider = "─".repeat(DIVIDER_WIDTH);
    chunks
        .iter()
        .map(|chunk| {
            let mut header = vec![format!(
                "File: {}",
                chunk.file_path.as_deref().unwrap_or("unknown")
            )];
            if let Some(name) = &chunk.function_name {
                header.push(format!("Function: {name}"));
            }
            if let (Some(start), Some(end)) = (chunk.start_line, chunk.end_line) {
                header.push(format!("Lines: {start}-{end}"));
            }
            header.push(format!("Source: {}", chunk.source));

            format!("{}\n{divider}\n{}", header.join(" | "), chunk.text)
        })
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
}
