use super::{Db, models::IndexRun, serialize_vector};
use crate::indexer::CodeChunk;
use crate::retrieval::IndexedChunk;
use chrono::Utc;
use rusqlite::{OptionalExtension, Result, params};
use std::collections::HashSet;

impl Db {
    /// Inserts or replaces chunks and their vectors, keyed by chunk id.
    ///
    /// `embeddings[i]` belongs to `chunks[i]`; surplus entries on either side
    /// are ignored.
    pub fn upsert_chunks(&mut self, chunks: &[CodeChunk], embeddings: &[Vec<f32>]) -> Result<usize> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;
        let mut written = 0;

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let row_id: i64 = tx.query_row(
                r#"
                INSERT INTO chunks (
                    chunk_id, file_path, function_name, language, start_line, end_line,
                    content, context, call_count, incoming_count, indexed_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    file_path = excluded.file_path,
                    function_name = excluded.function_name,
                    language = excluded.language,
                    start_line = excluded.start_line,
                    end_line = excluded.end_line,
                    content = excluded.content,
                    context = excluded.context,
                    call_count = excluded.call_count,
                    incoming_count = excluded.incoming_count,
                    indexed_at = excluded.indexed_at
                RETURNING id
                "#,
                params![
                    chunk.id,
                    chunk.file_path,
                    chunk.metadata.function_name,
                    chunk.language,
                    chunk.start_line as i64,
                    chunk.end_line as i64,
                    chunk.text,
                    chunk.context,
                    chunk.metadata.call_count as i64,
                    chunk.metadata.incoming_count as i64,
                    now,
                ],
                |row| row.get(0),
            )?;

            // vec0 has no upsert
            tx.execute("DELETE FROM vec_chunks WHERE rowid = ?", params![row_id])?;
            tx.execute(
                "INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)",
                params![row_id, serialize_vector(embedding)],
            )?;
            written += 1;
        }

        tx.commit()?;
        Ok(written)
    }

    /// Deletes chunk rows (and vectors) whose id is not in `live`.
    pub fn remove_stale_chunks(&mut self, live: &HashSet<String>) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let stale: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id, chunk_id FROM chunks")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let mut stale = Vec::new();
            for row in rows {
                let (id, chunk_id): (i64, String) = row?;
                if !live.contains(&chunk_id) {
                    stale.push(id);
                }
            }
            stale
        };

        for id in &stale {
            tx.execute("DELETE FROM vec_chunks WHERE rowid = ?", params![id])?;
            tx.execute("DELETE FROM chunks WHERE id = ?", params![id])?;
        }

        tx.commit()?;
        Ok(stale.len())
    }

    /// Replaces the whole keyword index with `chunks`.
    pub fn replace_keyword_index(&mut self, chunks: &[IndexedChunk]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM keyword_chunks", [])?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO keyword_chunks (
                    chunk_id, content, file_path, function_name, language, start_line, end_line
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    chunk.id,
                    chunk.text,
                    chunk.file_path,
                    chunk.function_name,
                    chunk.language,
                    chunk.start_line as i64,
                    chunk.end_line as i64,
                ])?;
            }
        }

        tx.commit()?;
        Ok(chunks.len())
    }

    pub fn chunk_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn keyword_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM keyword_chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn record_run(&self, run: &IndexRun) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO index_runs (
                root, started_at, finished_at, files, functions, edges, chunks,
                vector_ok, keyword_ok
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                run.root,
                run.started_at,
                run.finished_at,
                run.files as i64,
                run.functions as i64,
                run.edges as i64,
                run.chunks as i64,
                run.vector_ok,
                run.keyword_ok,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn last_run(&self) -> Result<Option<IndexRun>> {
        self.conn
            .query_row(
                r#"
                SELECT root, started_at, finished_at, files, functions, edges, chunks,
                       vector_ok, keyword_ok
                FROM index_runs
                ORDER BY id DESC
                LIMIT 1
                "#,
                [],
                |row| {
                    Ok(IndexRun {
                        root: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        files: row.get::<_, i64>(3)? as usize,
                        functions: row.get::<_, i64>(4)? as usize,
                        edges: row.get::<_, i64>(5)? as usize,
                        chunks: row.get::<_, i64>(6)? as usize,
                        vector_ok: row.get(7)?,
                        keyword_ok: row.get(8)?,
                    })
                },
            )
            .optional()
    }
}
