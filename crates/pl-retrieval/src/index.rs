//! Capability traits the engine searches through.
//!
//! The storage backends implement these directly; tests substitute stubs that
//! fail or stall on demand.

use pl_core::{Chunk, ChunkId, ScoredResult};
use pl_storage::{DocumentStore, FullTextStore, StorageError, VectorStore};

/// Nearest-neighbor search over fixed-dimension embeddings.
pub trait VectorIndex: Send + Sync {
    fn dimension(&self) -> usize;

    /// Up to `k` hits by non-decreasing distance; `score` is the distance.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredResult>, StorageError>;
}

/// Keyword search with BM25 scoring.
pub trait LexicalIndex: Send + Sync {
    /// Up to `k` hits, best first; `score` is the BM25 score.
    fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredResult>, StorageError>;
}

/// Resolves chunk ids to full records.
pub trait DocumentSource: Send + Sync {
    /// Records in input order; unknown ids are skipped.
    fn get(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>, StorageError>;
}

impl VectorIndex for VectorStore {
    fn dimension(&self) -> usize {
        VectorStore::dimension(self)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredResult>, StorageError> {
        let hits = self.search_knn(query, k)?;
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(rank, hit)| ScoredResult {
                chunk_id: hit.chunk_id,
                score: hit.distance,
                rank,
            })
            .collect())
    }
}

impl LexicalIndex for FullTextStore {
    fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredResult>, StorageError> {
        let hits = self.search_bm25(query, k)?;
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(rank, hit)| ScoredResult {
                chunk_id: hit.chunk_id,
                score: hit.score,
                rank,
            })
            .collect())
    }
}

impl DocumentSource for DocumentStore {
    fn get(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>, StorageError> {
        DocumentStore::get(self, ids)
    }
}
