use std::collections::HashMap;

use pl_core::{ChunkId, FusedResult, ScoredResult};

use crate::error::RetrievalError;

/// RRF smoothing constant (K in `1/(K + rank + 1)`).
pub const RRF_K: f64 = 60.0;

/// RRF contribution of a zero-based rank under the default constant.
pub fn rrf_score(rank: usize) -> f64 {
    contribution(RRF_K, rank)
}

fn contribution(k_constant: f64, rank: usize) -> f64 {
    1.0 / (k_constant + rank as f64 + 1.0)
}

/// Reciprocal Rank Fusion of a vector list and a lexical list.
///
/// Only ranks matter: an item at position `r` of a list contributes
/// `1/(K + r + 1)`, and an item in both lists gets both contributions. The
/// native scores of the two methods are never compared.
///
/// Callers should fetch at least `2k` candidates from each source so items
/// ranked moderately by both methods can surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankFuser {
    k_constant: f64,
}

impl Default for RankFuser {
    fn default() -> Self {
        Self { k_constant: RRF_K }
    }
}

impl RankFuser {
    pub fn new(k_constant: f64) -> Result<Self, RetrievalError> {
        if !k_constant.is_finite() || k_constant < 0.0 {
            return Err(RetrievalError::InvalidArgument {
                reason: format!("RRF constant must be finite and non-negative, got {k_constant}"),
            });
        }
        Ok(Self { k_constant })
    }

    pub fn k_constant(&self) -> f64 {
        self.k_constant
    }

    /// Merge both lists and return the top `k` by fused score.
    ///
    /// Ties break on vector rank, then lexical rank (absent ranks last), then
    /// ascending chunk id. A repeated id within one list counts only at its
    /// first position. Either list may be empty.
    pub fn fuse(
        &self,
        vector: &[ScoredResult],
        lexical: &[ScoredResult],
        k: usize,
    ) -> Result<Vec<FusedResult>, RetrievalError> {
        if k == 0 {
            return Err(RetrievalError::InvalidArgument {
                reason: "k must be at least 1".to_string(),
            });
        }

        let mut candidates: HashMap<ChunkId, FusedResult> =
            HashMap::with_capacity(vector.len() + lexical.len());

        for (rank, hit) in vector.iter().enumerate() {
            let entry = candidates.entry(hit.chunk_id).or_insert_with(|| empty(hit.chunk_id));
            if entry.vector_rank.is_none() {
                entry.vector_rank = Some(rank);
                entry.fused_score += contribution(self.k_constant, rank);
            }
        }

        for (rank, hit) in lexical.iter().enumerate() {
            let entry = candidates.entry(hit.chunk_id).or_insert_with(|| empty(hit.chunk_id));
            if entry.lexical_rank.is_none() {
                entry.lexical_rank = Some(rank);
                entry.fused_score += contribution(self.k_constant, rank);
            }
        }

        let mut fused: Vec<FusedResult> = candidates.into_values().collect();
        fused.sort_by(FusedResult::ranking_cmp);
        fused.truncate(k);
        Ok(fused)
    }
}

fn empty(chunk_id: ChunkId) -> FusedResult {
    FusedResult {
        chunk_id,
        fused_score: 0.0,
        vector_rank: None,
        lexical_rank: None,
    }
}
