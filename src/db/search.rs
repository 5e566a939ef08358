use super::models::{KeywordMatch, StoredChunk, VectorMatch};
use super::{Db, serialize_vector};
use rusqlite::{Result, params};

/// Turns free text into an FTS5 expression: quoted prefix terms joined by OR.
///
/// Only alphanumeric runs survive, so the result never carries FTS5 syntax.
/// Returns `None` when nothing searchable remains.
///
/// Matching is exact-prefix only: `valid` finds `validate`, a misspelling
/// such as `valdiate` finds nothing.
pub fn sanitize_fts_query(query: &str, max_terms: usize) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| seen.insert(t.clone()))
        .take(max_terms)
        .map(|t| format!("\"{t}\"*"))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn map_vector_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VectorMatch> {
    // NULL when either side is a zero vector
    let distance: Option<f64> = row.get(7)?;
    Ok(VectorMatch {
        chunk: StoredChunk {
            chunk_id: row.get(0)?,
            file_path: row.get(1)?,
            function_name: row.get(2)?,
            language: row.get(3)?,
            start_line: row.get::<_, i64>(4)? as usize,
            end_line: row.get::<_, i64>(5)? as usize,
            content: row.get(6)?,
        },
        distance: distance.unwrap_or(2.0),
    })
}

fn map_keyword_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<KeywordMatch> {
    let weight: f64 = row.get(7)?;
    Ok(KeywordMatch {
        chunk: StoredChunk {
            chunk_id: row.get(0)?,
            file_path: row.get(1)?,
            function_name: row.get(2)?,
            language: row.get(3)?,
            start_line: row.get::<_, i64>(4)? as usize,
            end_line: row.get::<_, i64>(5)? as usize,
            content: row.get(6)?,
        },
        score: -weight,
    })
}

impl Db {
    /// Nearest chunks by cosine distance, closest first.
    pub fn vector_search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                c.chunk_id,
                c.file_path,
                c.function_name,
                c.language,
                c.start_line,
                c.end_line,
                c.content,
                vec_distance_cosine(v.embedding, ?) AS distance
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            ORDER BY distance ASC, c.chunk_id ASC
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map(
            params![serialize_vector(query_vector), top_k as i64],
            map_vector_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// bm25-ranked keyword search, best first. Function names weigh 2.0,
    /// file paths 1.5 and content 1.0.
    pub fn keyword_search(
        &self,
        query: &str,
        top_k: usize,
        max_terms: usize,
    ) -> Result<Vec<KeywordMatch>> {
        let Some(expression) = sanitize_fts_query(query, max_terms) else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                chunk_id,
                file_path,
                function_name,
                language,
                start_line,
                end_line,
                content,
                bm25(keyword_chunks, 0.0, 1.0, 1.5, 2.0, 0.0, 0.0, 0.0) AS weight
            FROM keyword_chunks
            WHERE keyword_chunks MATCH ?
            ORDER BY weight ASC, chunk_id ASC
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map(params![expression, top_k as i64], map_keyword_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}
