use std::path::{Path, PathBuf};
use std::sync::Arc;

use pl_core::ChunkId;
use serde::{Deserialize, Serialize};

use crate::document::DocumentStore;
use crate::error::StorageError;
use crate::fulltext::FullTextStore;
use crate::vector::VectorStore;

/// SQLite errors that indicate a corrupted or incompatible database file.
fn is_sqlite_corruption(err: &rusqlite::Error) -> bool {
    use rusqlite::ErrorCode;
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase
        ),
        _ => false,
    }
}

/// Embedding dimension used when the storage root has no metadata yet.
pub const DEFAULT_VECTOR_DIMENSION: usize = 384;

/// Layout version of the storage root as a whole.
const STORAGE_SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "meta.json";
const DOCUMENTS_FILE: &str = "documents.sqlite";
const FULLTEXT_DIR: &str = "tantivy";
const VECTOR_FILE: &str = "vectors.usearch";

/// Contents of `<root>/meta.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageMeta {
    pub embedding_dim: usize,
    pub schema_version: u32,
}

impl StorageMeta {
    fn read(root: &Path) -> Result<Option<Self>, StorageError> {
        let path = root.join(META_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    fn write(&self, root: &Path) -> Result<(), StorageError> {
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        std::fs::write(root.join(META_FILE), content)?;
        Ok(())
    }
}

/// How far the vector index has drifted from the document store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub document_count: usize,
    pub vector_count: usize,
    pub fulltext_count: u64,
    /// Ids with a vector but no document record, ascending.
    pub missing_documents: Vec<ChunkId>,
}

impl ConsistencyReport {
    /// Every indexed vector resolves to a stored document.
    pub fn is_consistent(&self) -> bool {
        self.missing_documents.is_empty()
    }
}

fn consistency(
    documents: &DocumentStore,
    vector: &VectorStore,
    fulltext: &FullTextStore,
) -> Result<ConsistencyReport, StorageError> {
    let vector_ids = vector.ids();
    let known = documents.content_hashes(&vector_ids)?;
    let missing_documents = vector_ids
        .into_iter()
        .filter(|id| !known.contains_key(id))
        .collect();
    Ok(ConsistencyReport {
        document_count: documents.count()?,
        vector_count: vector.len(),
        fulltext_count: fulltext.num_docs(),
        missing_documents,
    })
}

/// Read-write facade over DocumentStore, FullTextStore, and VectorStore.
///
/// Owns the storage root directory and coordinates initialization, corruption
/// recovery, and access to all three backends. Ingestion writes through a
/// manager; serving reads through a [`StorageSnapshot`].
pub struct StorageManager {
    documents: DocumentStore,
    fulltext: FullTextStore,
    vector: VectorStore,
    root: PathBuf,
}

impl StorageManager {
    /// Open or create the storage root.
    ///
    /// Reads the vector dimension from `meta.json` if it exists, otherwise
    /// uses the default (384).
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        let dim = StorageMeta::read(root)
            .ok()
            .flatten()
            .map(|m| m.embedding_dim)
            .filter(|&d| d > 0)
            .unwrap_or(DEFAULT_VECTOR_DIMENSION);
        Self::open_with_dimension(root, dim)
    }

    /// Open or create with an explicit vector dimension.
    ///
    /// If any backend fails integrity checks (schema version mismatch,
    /// corrupted SQLite, unusable indexes), the whole root is purged and
    /// re-initialized. A root built for another dimension, or one held by
    /// another writer, is an error and is left untouched.
    pub fn open_with_dimension(root: &Path, vector_dimension: usize) -> Result<Self, StorageError> {
        match Self::try_open(root, vector_dimension) {
            Ok(mgr) => Ok(mgr),
            Err(e) if Self::should_purge(&e) => {
                tracing::warn!(root = %root.display(), error = %e, "storage root unusable, purging");
                Self::purge(root)?;
                Self::try_open(root, vector_dimension)
            }
            Err(e) => Err(e),
        }
    }

    /// Attempt to open all three backends, creating the layout if needed.
    fn try_open(root: &Path, vector_dimension: usize) -> Result<Self, StorageError> {
        std::fs::create_dir_all(root)?;

        match StorageMeta::read(root) {
            Ok(Some(meta)) if meta.schema_version != STORAGE_SCHEMA_VERSION => {
                return Err(StorageError::SchemaMismatch {
                    expected: STORAGE_SCHEMA_VERSION,
                    actual: meta.schema_version,
                });
            }
            Ok(Some(meta)) if meta.embedding_dim != vector_dimension => {
                return Err(StorageError::DimensionMismatch {
                    expected: vector_dimension,
                    actual: meta.embedding_dim,
                });
            }
            Ok(_) => {}
            Err(StorageError::Json(e)) => {
                tracing::warn!(error = %e, "unreadable storage metadata");
                return Err(StorageError::SchemaMismatch {
                    expected: STORAGE_SCHEMA_VERSION,
                    actual: 0,
                });
            }
            Err(e) => return Err(e),
        }

        let documents = DocumentStore::open(&root.join(DOCUMENTS_FILE))?;
        let fulltext = FullTextStore::open(&root.join(FULLTEXT_DIR))?;
        let vector = VectorStore::open(&root.join(VECTOR_FILE), vector_dimension)?;

        StorageMeta {
            embedding_dim: vector_dimension,
            schema_version: STORAGE_SCHEMA_VERSION,
        }
        .write(root)?;

        Ok(Self {
            documents,
            fulltext,
            vector,
            root: root.to_path_buf(),
        })
    }

    /// Decide whether an error warrants purging the entire storage root.
    fn should_purge(err: &StorageError) -> bool {
        match err {
            StorageError::SchemaMismatch { .. }
            | StorageError::VectorIndexUnavailable { .. }
            | StorageError::FullTextIndexUnavailable { .. } => true,
            StorageError::Sqlite(e) => is_sqlite_corruption(e),
            StorageError::Tantivy(e) => !matches!(e, tantivy::TantivyError::LockFailure(..)),
            _ => false,
        }
    }

    /// Delete the entire storage root.
    fn purge(root: &Path) -> Result<(), StorageError> {
        if root.exists() {
            std::fs::remove_dir_all(root)?;
        }
        Ok(())
    }

    /// Open a read-only snapshot of an initialized storage root.
    pub fn open_read_only(root: &Path) -> Result<StorageSnapshot, StorageError> {
        StorageSnapshot::open(root)
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut DocumentStore {
        &mut self.documents
    }

    pub fn fulltext(&self) -> &FullTextStore {
        &self.fulltext
    }

    pub fn fulltext_mut(&mut self) -> &mut FullTextStore {
        &mut self.fulltext
    }

    pub fn vector(&self) -> &VectorStore {
        &self.vector
    }

    pub fn vector_mut(&mut self) -> &mut VectorStore {
        &mut self.vector
    }

    /// The storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dimension(&self) -> usize {
        self.vector.dimension()
    }

    /// Persist all backends that require explicit flushing.
    ///
    /// - Commits pending Tantivy documents.
    /// - Saves the vector index to disk.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.fulltext.commit()?;
        self.vector.save(&self.root.join(VECTOR_FILE))?;
        Ok(())
    }

    /// Report vector ids that do not resolve in the document store.
    pub fn check_consistency(&self) -> Result<ConsistencyReport, StorageError> {
        consistency(&self.documents, &self.vector, &self.fulltext)
    }

    /// Flush, release the writers, and reopen the root read-only.
    pub fn into_snapshot(mut self) -> Result<StorageSnapshot, StorageError> {
        self.flush()?;
        let root = self.root.clone();
        drop(self);
        StorageSnapshot::open(&root)
    }
}

/// Immutable, shareable view of a storage root for serving queries.
///
/// All three stores are opened read-only. The vector and full-text views are
/// fixed at open time; the document store reads live rows, which ingestion
/// only ever upserts.
#[derive(Clone)]
pub struct StorageSnapshot {
    pub documents: Arc<DocumentStore>,
    pub fulltext: Arc<FullTextStore>,
    pub vector: Arc<VectorStore>,
    root: PathBuf,
}

impl StorageSnapshot {
    /// Open a root previously initialized by [`StorageManager`].
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        let meta = StorageMeta::read(root)?.ok_or_else(|| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no storage metadata under {}", root.display()),
            ))
        })?;
        if meta.schema_version != STORAGE_SCHEMA_VERSION {
            return Err(StorageError::SchemaMismatch {
                expected: STORAGE_SCHEMA_VERSION,
                actual: meta.schema_version,
            });
        }

        let documents = DocumentStore::open_read_only(&root.join(DOCUMENTS_FILE))?;
        let fulltext = FullTextStore::open_read_only(&root.join(FULLTEXT_DIR))?;
        let vector = VectorStore::open(&root.join(VECTOR_FILE), meta.embedding_dim)?;

        tracing::debug!(
            root = %root.display(),
            vectors = vector.len(),
            "opened storage snapshot"
        );

        Ok(Self {
            documents: Arc::new(documents),
            fulltext: Arc::new(fulltext),
            vector: Arc::new(vector),
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dimension(&self) -> usize {
        self.vector.dimension()
    }

    pub fn check_consistency(&self) -> Result<ConsistencyReport, StorageError> {
        consistency(&self.documents, &self.vector, &self.fulltext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_core::Chunk;
    use tempfile::TempDir;

    fn chunk(id: u64, text: &str) -> Chunk {
        let mut c = Chunk::new(ChunkId(id), text);
        c.paper_title = format!("Paper {id}");
        c
    }

    fn populate(mgr: &mut StorageManager, chunks: &[Chunk]) {
        mgr.documents_mut().put(chunks).unwrap();
        for c in chunks {
            mgr.fulltext_mut().add_chunk(c).unwrap();
        }
        let ids: Vec<ChunkId> = chunks.iter().map(|c| c.chunk_id).collect();
        let vectors: Vec<Vec<f32>> = chunks
            .iter()
            .map(|c| vec![c.chunk_id.0 as f32, 1.0, 0.0, 0.0])
            .collect();
        mgr.vector_mut().add(&ids, &vectors).unwrap();
    }

    #[test]
    fn open_creates_directory_structure() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("store");
        let mgr = StorageManager::open(&root).unwrap();

        assert!(mgr.root().join(DOCUMENTS_FILE).exists());
        assert!(mgr.root().join(FULLTEXT_DIR).exists());
        assert!(mgr.root().join(META_FILE).exists());
        assert_eq!(mgr.dimension(), DEFAULT_VECTOR_DIMENSION);
    }

    #[test]
    fn meta_records_dimension() {
        let tmp = TempDir::new().unwrap();
        {
            let _mgr = StorageManager::open_with_dimension(tmp.path(), 8).unwrap();
        }
        let meta = StorageMeta::read(tmp.path()).unwrap().unwrap();
        assert_eq!(meta.embedding_dim, 8);
        assert_eq!(meta.schema_version, STORAGE_SCHEMA_VERSION);

        let mgr = StorageManager::open(tmp.path()).unwrap();
        assert_eq!(mgr.dimension(), 8);
    }

    #[test]
    fn reopen_with_other_dimension_is_rejected() {
        let tmp = TempDir::new().unwrap();
        {
            let _mgr = StorageManager::open_with_dimension(tmp.path(), 8).unwrap();
        }
        let result = StorageManager::open_with_dimension(tmp.path(), 16);
        assert!(matches!(
            result,
            Err(StorageError::DimensionMismatch {
                expected: 16,
                actual: 8
            })
        ));
    }

    #[test]
    fn corrupted_sqlite_triggers_purge_and_rebuild() {
        let tmp = TempDir::new().unwrap();
        {
            let mut mgr = StorageManager::open_with_dimension(tmp.path(), 4).unwrap();
            populate(&mut mgr, &[chunk(1, "alpha")]);
            mgr.flush().unwrap();
        }

        std::fs::write(tmp.path().join(DOCUMENTS_FILE), b"not a sqlite database").unwrap();

        let mgr = StorageManager::open_with_dimension(tmp.path(), 4).unwrap();
        assert_eq!(mgr.documents().count().unwrap(), 0);
        assert!(mgr.vector().is_empty());
    }

    #[test]
    fn corrupted_meta_triggers_purge() {
        let tmp = TempDir::new().unwrap();
        {
            let _mgr = StorageManager::open_with_dimension(tmp.path(), 4).unwrap();
        }
        std::fs::write(tmp.path().join(META_FILE), b"{ not json").unwrap();

        let mgr = StorageManager::open_with_dimension(tmp.path(), 4).unwrap();
        assert_eq!(mgr.dimension(), 4);
    }

    #[test]
    fn second_writer_is_rejected_without_purging() {
        let tmp = TempDir::new().unwrap();
        let mut first = StorageManager::open_with_dimension(tmp.path(), 4).unwrap();
        populate(&mut first, &[chunk(1, "alpha"), chunk(2, "beta")]);
        first.flush().unwrap();

        let err = StorageManager::open_with_dimension(tmp.path(), 4)
            .err()
            .expect("second writer must not open a held root");
        assert!(matches!(err, StorageError::Locked { .. }), "{err}");
        assert!(err.is_retryable());

        assert!(tmp.path().join(DOCUMENTS_FILE).exists());
        assert_eq!(first.documents().count().unwrap(), 2);
        populate(&mut first, &[chunk(3, "gamma")]);
        first.flush().unwrap();
        drop(first);

        let reopened = StorageManager::open_with_dimension(tmp.path(), 4).unwrap();
        assert_eq!(reopened.documents().count().unwrap(), 3);
        assert_eq!(reopened.vector().len(), 3);
        assert!(reopened.check_consistency().unwrap().is_consistent());
    }

    #[test]
    fn full_lifecycle_integration() {
        let tmp = TempDir::new().unwrap();
        let chunks = [chunk(1, "sparse mixture of experts"), chunk(2, "contrastive pretraining")];

        {
            let mut mgr = StorageManager::open_with_dimension(tmp.path(), 4).unwrap();
            populate(&mut mgr, &chunks);
            mgr.flush().unwrap();
        }

        let mgr = StorageManager::open(tmp.path()).unwrap();
        assert_eq!(mgr.documents().count().unwrap(), 2);
        assert_eq!(mgr.vector().len(), 2);
        let hits = mgr.fulltext().search_bm25("experts", 10).unwrap();
        assert_eq!(hits[0].chunk_id, ChunkId(1));
        assert!(mgr.check_consistency().unwrap().is_consistent());
    }

    #[test]
    fn consistency_reports_dangling_vectors() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = StorageManager::open_with_dimension(tmp.path(), 4).unwrap();
        populate(&mut mgr, &[chunk(1, "a")]);
        mgr.vector_mut()
            .add_vector(ChunkId(9), &[0.0, 0.0, 1.0, 0.0])
            .unwrap();

        let report = mgr.check_consistency().unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.missing_documents, vec![ChunkId(9)]);
        assert_eq!(report.vector_count, 2);
        assert_eq!(report.document_count, 1);
    }

    #[test]
    fn snapshot_reads_flushed_state() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = StorageManager::open_with_dimension(tmp.path(), 4).unwrap();
        populate(&mut mgr, &[chunk(1, "graph attention"), chunk(2, "message passing")]);

        let snapshot = mgr.into_snapshot().unwrap();
        assert_eq!(snapshot.dimension(), 4);
        assert_eq!(snapshot.documents.count().unwrap(), 2);
        assert_eq!(snapshot.vector.len(), 2);
        let hits = snapshot.fulltext.search_bm25("passing", 5).unwrap();
        assert_eq!(hits[0].chunk_id, ChunkId(2));
        assert!(snapshot.check_consistency().unwrap().is_consistent());
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let tmp = TempDir::new().unwrap();
        {
            let mut mgr = StorageManager::open_with_dimension(tmp.path(), 4).unwrap();
            populate(&mut mgr, &[chunk(1, "first")]);
            mgr.flush().unwrap();
        }
        let snapshot = StorageManager::open_read_only(tmp.path()).unwrap();

        {
            let mut mgr = StorageManager::open_with_dimension(tmp.path(), 4).unwrap();
            populate(&mut mgr, &[chunk(2, "second")]);
            mgr.flush().unwrap();
        }

        assert_eq!(snapshot.vector.len(), 1);
        assert!(snapshot.fulltext.search_bm25("second", 5).unwrap().is_empty());

        let fresh = StorageManager::open_read_only(tmp.path()).unwrap();
        assert_eq!(fresh.vector.len(), 2);
    }

    #[test]
    fn snapshot_of_uninitialized_root_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(StorageSnapshot::open(&tmp.path().join("missing")).is_err());
    }
}
