use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use pl_core::{Chunk, ChunkId};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::StorageError;

/// Current schema version. Increment when schema changes.
const SCHEMA_VERSION: u32 = 1;

/// Default number of rows per write transaction.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// SQLite caps bound parameters per statement; id lookups are split below it.
const MAX_IDS_PER_QUERY: usize = 500;

const CHUNK_COLUMNS: &str =
    "chunk_id, content, paper_title, authors, year, arxiv_id, source_pdf";

/// SQLite-backed store of chunk records keyed by `chunk_id`.
///
/// The connection sits behind a mutex so a single store can be shared across
/// query threads; reads are short point lookups.
pub struct DocumentStore {
    conn: Mutex<Connection>,
    read_only: bool,
}

impl DocumentStore {
    /// Open or create a document store at the given SQLite database path.
    ///
    /// If the schema version doesn't match, returns `Err` so the caller
    /// can purge the storage root and retry.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        configure_pragmas(&conn)?;

        let stored_version = get_user_version(&conn)?;
        if stored_version != 0 && stored_version != SCHEMA_VERSION {
            return Err(StorageError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                actual: stored_version,
            });
        }

        create_schema(&conn)?;
        set_user_version(&conn, SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            read_only: false,
        })
    }

    /// Open an existing database for reads only.
    ///
    /// The connection runs with `query_only` set, so any write through it
    /// fails inside SQLite as well.
    pub fn open_read_only(db_path: &Path) -> Result<Self, StorageError> {
        if !db_path.exists() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no document store at {}", db_path.display()),
            )));
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;\
             PRAGMA query_only = ON;",
        )?;

        let stored_version = get_user_version(&conn)?;
        if stored_version != SCHEMA_VERSION {
            return Err(StorageError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                actual: stored_version,
            });
        }

        Ok(Self {
            conn: Mutex::new(conn),
            read_only: true,
        })
    }

    /// Open an in-memory document store (for testing).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        configure_pragmas(&conn)?;
        create_schema(&conn)?;
        set_user_version(&conn, SCHEMA_VERSION)?;
        Ok(Self {
            conn: Mutex::new(conn),
            read_only: false,
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Upsert chunks by id in transactions of `DEFAULT_BATCH_SIZE` rows.
    pub fn put(&mut self, chunks: &[Chunk]) -> Result<(), StorageError> {
        self.put_batched(chunks, DEFAULT_BATCH_SIZE)
    }

    /// Upsert chunks by id in batched transactions.
    pub fn put_batched(&mut self, chunks: &[Chunk], batch_size: usize) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly { store: "document" });
        }
        let conn = self.conn.get_mut().map_err(|e| StorageError::LockPoisoned {
            reason: e.to_string(),
        })?;
        for batch in chunks.chunks(batch_size.max(1)) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO documents \
                     (chunk_id, content, paper_title, authors, year, arxiv_id, source_pdf, content_hash) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;
                for chunk in batch {
                    stmt.execute(params![
                        chunk.chunk_id.to_sql(),
                        chunk.text,
                        chunk.paper_title,
                        chunk.authors,
                        chunk.year,
                        chunk.arxiv_id,
                        chunk.source_pdf,
                        chunk.content_hash() as i64,
                    ])?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// Fetch chunks for `ids`, in the order given.
    ///
    /// Ids with no stored record are skipped; a repeated id yields a repeated
    /// record.
    pub fn get(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;

        let mut unique: Vec<ChunkId> = ids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let mut found: HashMap<ChunkId, Chunk> = HashMap::with_capacity(unique.len());
        for batch in unique.chunks(MAX_IDS_PER_QUERY) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "SELECT {CHUNK_COLUMNS} FROM documents WHERE chunk_id IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(batch.iter().map(|id| id.to_sql())), |row| {
                row_to_chunk(row)
            })?;
            for row in rows {
                let chunk = row?;
                found.insert(chunk.chunk_id, chunk);
            }
        }

        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }

    /// Fetch a single chunk.
    pub fn get_one(&self, id: ChunkId) -> Result<Option<Chunk>, StorageError> {
        let conn = self.lock()?;
        let chunk = conn
            .query_row(
                &format!("SELECT {CHUNK_COLUMNS} FROM documents WHERE chunk_id = ?1"),
                params![id.to_sql()],
                row_to_chunk,
            )
            .optional()?;
        Ok(chunk)
    }

    pub fn contains(&self, id: ChunkId) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE chunk_id = ?1)",
            params![id.to_sql()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Total number of stored chunks.
    pub fn count(&self) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Stored content hashes for the given ids. Ids with no record are absent
    /// from the map.
    pub fn content_hashes(&self, ids: &[ChunkId]) -> Result<HashMap<ChunkId, u64>, StorageError> {
        let conn = self.lock()?;
        let mut hashes = HashMap::with_capacity(ids.len());
        for batch in ids.chunks(MAX_IDS_PER_QUERY) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "SELECT chunk_id, content_hash FROM documents WHERE chunk_id IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(batch.iter().map(|id| id.to_sql())), |row| {
                Ok((ChunkId::from_sql(row.get(0)?), row.get::<_, i64>(1)? as u64))
            })?;
            for row in rows {
                let (id, hash) = row?;
                hashes.insert(id, hash);
            }
        }
        Ok(hashes)
    }

    /// All stored ids, ascending.
    pub fn ids(&self) -> Result<Vec<ChunkId>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT chunk_id FROM documents")?;
        let rows = stmt.query_map([], |row| Ok(ChunkId::from_sql(row.get(0)?)))?;
        let mut ids = rows.collect::<Result<Vec<_>, _>>()?;
        ids.sort_unstable();
        Ok(ids)
    }

    /// Delete a chunk. Returns true if a row was removed.
    pub fn delete(&mut self, id: ChunkId) -> Result<bool, StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly { store: "document" });
        }
        let conn = self.conn.get_mut().map_err(|e| StorageError::LockPoisoned {
            reason: e.to_string(),
        })?;
        let affected = conn.execute(
            "DELETE FROM documents WHERE chunk_id = ?1",
            params![id.to_sql()],
        )?;
        Ok(affected > 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|e| StorageError::LockPoisoned {
            reason: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn configure_pragmas(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\
         PRAGMA busy_timeout = 5000;\
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(())
}

fn get_user_version(conn: &Connection) -> Result<u32, StorageError> {
    let v: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(v)
}

fn set_user_version(conn: &Connection, version: u32) -> Result<(), StorageError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS documents (
            chunk_id     INTEGER PRIMARY KEY,
            content      TEXT NOT NULL,
            paper_title  TEXT NOT NULL DEFAULT '',
            authors      TEXT NOT NULL DEFAULT '',
            year         INTEGER,
            arxiv_id     TEXT NOT NULL DEFAULT '',
            source_pdf   TEXT NOT NULL DEFAULT '',
            content_hash INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_arxiv ON documents(arxiv_id);",
    )?;
    Ok(())
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        chunk_id: ChunkId::from_sql(row.get(0)?),
        text: row.get(1)?,
        paper_title: row.get(2)?,
        authors: row.get(3)?,
        year: row.get(4)?,
        arxiv_id: row.get(5)?,
        source_pdf: row.get(6)?,
    })
}
