//! Index store using SQLite, sqlite-vec and FTS5
use rusqlite::{Connection, Result};
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use tracing::info;

pub mod chunks;
pub mod models;
pub mod search;

fn schema_sql(dimensions: usize) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chunk_id TEXT NOT NULL UNIQUE,
    file_path TEXT NOT NULL,
    function_name TEXT NOT NULL,
    language TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    content TEXT NOT NULL,
    context TEXT NOT NULL,
    call_count INTEGER NOT NULL DEFAULT 0,
    incoming_count INTEGER NOT NULL DEFAULT 0,
    indexed_at DATETIME NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_path);

CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(
    embedding FLOAT[{dimensions}]
);

CREATE VIRTUAL TABLE IF NOT EXISTS keyword_chunks USING fts5(
    chunk_id UNINDEXED,
    content,
    file_path,
    function_name,
    language UNINDEXED,
    start_line UNINDEXED,
    end_line UNINDEXED
);

CREATE TABLE IF NOT EXISTS index_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    root TEXT NOT NULL,
    started_at DATETIME NOT NULL,
    finished_at DATETIME NOT NULL,
    files INTEGER NOT NULL,
    functions INTEGER NOT NULL,
    edges INTEGER NOT NULL,
    chunks INTEGER NOT NULL,
    vector_ok INTEGER NOT NULL,
    keyword_ok INTEGER NOT NULL
);
"#
    )
}

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// A SQLite connection holding chunk rows, their vectors, the keyword index
/// and the run log.
pub struct Db {
    pub(crate) conn: Connection,
    dimensions: usize,
}

impl Db {
    /// Open a database connection at the given path and initialize the schema.
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        info!("Initializing database: {}", path.display());

        init_sqlite_vec();
        let conn = Connection::open(path)?;
        Self::init(conn, dimensions)
    }

    /// Open an in-memory database connection (useful for testing).
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> Result<Self> {
        // Verify sqlite-vec is loaded
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(&schema_sql(dimensions))?;

        Ok(Self { conn, dimensions })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual table
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}
