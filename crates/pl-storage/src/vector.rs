use std::collections::HashSet;
use std::path::Path;

use pl_core::ChunkId;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::StorageError;

/// A single search hit from k-NN search.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: ChunkId,
    /// Squared L2 distance to the query; lower is closer.
    pub distance: f32,
}

/// HNSW vector index backed by usearch.
///
/// Configuration: squared L2 distance, M=32, ef_construction=200, ef_search=100.
/// Dimension is fixed at creation time.
///
/// `ChunkId` is a u64 and doubles as the usearch key. The set of live keys is
/// tracked in memory and persisted as a sidecar file next to the index so it
/// can be enumerated for consistency checks.
pub struct VectorStore {
    index: Index,
    dimension: usize,
    keys: HashSet<u64>,
}

impl VectorStore {
    /// Create a new in-memory vector index with the given dimension.
    pub fn new(dimension: usize) -> Result<Self, StorageError> {
        if dimension == 0 {
            return Err(StorageError::InvalidArgument {
                reason: "vector dimension must be at least 1".to_string(),
            });
        }
        let index = create_index(dimension)?;
        Ok(Self {
            index,
            dimension,
            keys: HashSet::new(),
        })
    }

    /// Open an existing vector index from disk, or create a new one if the file doesn't exist.
    pub fn open(path: &Path, dimension: usize) -> Result<Self, StorageError> {
        if !path.exists() {
            return Self::new(dimension);
        }
        let index = create_index(dimension)?;
        index.load(path.to_str().unwrap_or("")).map_err(|e| {
            StorageError::VectorIndexUnavailable {
                reason: format!("failed to load vector index: {e}"),
            }
        })?;
        let loaded_dim = index.dimensions();
        if loaded_dim != dimension {
            return Err(StorageError::DimensionMismatch {
                expected: dimension,
                actual: loaded_dim,
            });
        }
        let keys = load_keys(path)?;
        if keys.len() != index.size() {
            return Err(StorageError::VectorIndexUnavailable {
                reason: format!(
                    "key sidecar lists {} ids but index holds {} vectors",
                    keys.len(),
                    index.size()
                ),
            });
        }
        Ok(Self {
            index,
            dimension,
            keys,
        })
    }

    /// The fixed dimension of vectors in this index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of vectors currently in the index.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, chunk_id: ChunkId) -> bool {
        self.keys.contains(&chunk_id.0)
    }

    /// All ids with a stored vector, ascending.
    pub fn ids(&self) -> Vec<ChunkId> {
        let mut ids: Vec<ChunkId> = self.keys.iter().copied().map(ChunkId).collect();
        ids.sort_unstable();
        ids
    }

    /// Add one vector per id. Existing ids are overwritten.
    ///
    /// All inputs are validated before anything is inserted, so a dimension
    /// error never leaves the index half-updated.
    pub fn add(&mut self, ids: &[ChunkId], vectors: &[Vec<f32>]) -> Result<(), StorageError> {
        if ids.len() != vectors.len() {
            return Err(StorageError::InvalidArgument {
                reason: format!("{} ids but {} vectors", ids.len(), vectors.len()),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(StorageError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        self.reserve_for(ids.len())?;
        for (id, vector) in ids.iter().zip(vectors) {
            self.add_vector(*id, vector)?;
        }
        Ok(())
    }

    /// Add a vector for the given chunk. Overwrites if the chunk already exists.
    pub fn add_vector(&mut self, chunk_id: ChunkId, vector: &[f32]) -> Result<(), StorageError> {
        if vector.len() != self.dimension {
            return Err(StorageError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        // Remove existing entry first so each key maps to exactly one vector.
        self.remove_vector(chunk_id)?;
        let key = chunk_id.0;
        self.reserve_for(1)?;
        self.index.add(key, vector).map_err(|e| {
            StorageError::VectorIndexUnavailable {
                reason: format!("add failed: {e}"),
            }
        })?;
        self.keys.insert(key);
        Ok(())
    }

    /// Remove the vector for the given chunk. Returns true if it existed.
    pub fn remove_vector(&mut self, chunk_id: ChunkId) -> Result<bool, StorageError> {
        let key = chunk_id.0;
        if !self.index.contains(key) {
            return Ok(false);
        }
        self.index.remove(key).map_err(|e| {
            StorageError::VectorIndexUnavailable {
                reason: format!("remove failed: {e}"),
            }
        })?;
        self.keys.remove(&key);
        Ok(true)
    }

    /// Search for the k nearest neighbors of the query vector.
    ///
    /// Hits are ordered by non-decreasing distance, ties by ascending id.
    /// An empty index yields an empty result rather than an error.
    pub fn search_knn(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>, StorageError> {
        if k == 0 {
            return Err(StorageError::InvalidArgument {
                reason: "k must be at least 1".to_string(),
            });
        }
        if query.len() != self.dimension {
            return Err(StorageError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.index.size() == 0 {
            return Ok(Vec::new());
        }
        let count = k.min(self.index.size());
        let matches = self.index.search(query, count).map_err(|e| {
            StorageError::VectorIndexUnavailable {
                reason: format!("search failed: {e}"),
            }
        })?;
        let mut hits: Vec<VectorHit> = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter(|(key, _)| self.keys.contains(key))
            .map(|(&key, &distance)| VectorHit {
                chunk_id: ChunkId(key),
                distance,
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Persist the index and key sidecar to disk.
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.index
            .save(path.to_str().unwrap_or(""))
            .map_err(|e| StorageError::VectorIndexUnavailable {
                reason: format!("save failed: {e}"),
            })?;
        save_keys(path, &self.keys)?;
        Ok(())
    }

    fn reserve_for(&mut self, additional: usize) -> Result<(), StorageError> {
        let needed = self.index.size() + additional;
        if needed > self.index.capacity() {
            let new_cap = needed.max(64) * 2;
            self.index.reserve(new_cap).map_err(|e| {
                StorageError::VectorIndexUnavailable {
                    reason: format!("reserve failed: {e}"),
                }
            })?;
        }
        Ok(())
    }
}

fn create_index(dimension: usize) -> Result<Index, StorageError> {
    let mut options = IndexOptions::default();
    options.dimensions = dimension;
    options.metric = MetricKind::L2sq;
    options.quantization = ScalarKind::F32;
    options.connectivity = 32; // M=32
    options.expansion_add = 200; // ef_construction=200
    options.expansion_search = 100; // ef_search=100

    Index::new(&options).map_err(|e| StorageError::VectorIndexUnavailable {
        reason: format!("failed to create index: {e}"),
    })
}

/// Sidecar file path for the key list.
fn keys_path(index_path: &Path) -> std::path::PathBuf {
    index_path.with_extension("keys")
}

/// Persist the key set as a flat binary file.
/// Format: [count: u64] [key: u64] * count
fn save_keys(index_path: &Path, keys: &HashSet<u64>) -> Result<(), StorageError> {
    let mut sorted: Vec<u64> = keys.iter().copied().collect();
    sorted.sort_unstable();
    let mut buf = Vec::with_capacity(8 + sorted.len() * 8);
    buf.extend_from_slice(&(sorted.len() as u64).to_le_bytes());
    for key in sorted {
        buf.extend_from_slice(&key.to_le_bytes());
    }
    std::fs::write(keys_path(index_path), &buf)?;
    Ok(())
}

fn load_keys(index_path: &Path) -> Result<HashSet<u64>, StorageError> {
    let path = keys_path(index_path);
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let data = std::fs::read(&path)?;
    let count = read_u64(&data, 0).ok_or_else(|| StorageError::VectorIndexUnavailable {
        reason: "key sidecar too short".to_string(),
    })? as usize;
    if data.len() != 8 + count * 8 {
        return Err(StorageError::VectorIndexUnavailable {
            reason: "key sidecar size mismatch".to_string(),
        });
    }
    Ok((0..count).filter_map(|i| read_u64(&data, 8 + i * 8)).collect())
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}
