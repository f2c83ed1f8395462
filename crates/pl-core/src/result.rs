use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkId;

/// A hit from a single retrieval method.
///
/// `score` keeps the method's native convention: squared L2 distance (lower is
/// better) for vector search, BM25 (higher is better) for lexical search. Only
/// `rank` is comparable across methods.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub chunk_id: ChunkId,
    pub score: f32,
    /// Zero-based position in the method's best-first ordering.
    pub rank: usize,
}

/// A hit after rank fusion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub chunk_id: ChunkId,
    pub fused_score: f64,
    pub vector_rank: Option<usize>,
    pub lexical_rank: Option<usize>,
}

impl FusedResult {
    /// Total order used for fused lists: higher score first, then the better
    /// vector rank, then the better lexical rank (absent ranks sort last), then
    /// ascending chunk id.
    pub fn ranking_cmp(&self, other: &Self) -> Ordering {
        other
            .fused_score
            .total_cmp(&self.fused_score)
            .then_with(|| rank_key(self.vector_rank).cmp(&rank_key(other.vector_rank)))
            .then_with(|| rank_key(self.lexical_rank).cmp(&rank_key(other.lexical_rank)))
            .then_with(|| self.chunk_id.cmp(&other.chunk_id))
    }
}

fn rank_key(rank: Option<usize>) -> usize {
    rank.unwrap_or(usize::MAX)
}

/// A hit after pairwise reranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankedResult {
    pub chunk_id: ChunkId,
    /// Only comparable within one reranking call.
    pub relevance_score: f32,
    /// Position of the candidate in the reranker's input.
    pub source_rank: usize,
}

/// Which scoring regime produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    VectorOnly,
    KeywordOnly,
    HybridRrf,
    HybridReranked,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VectorOnly => "vector_only",
            Self::KeywordOnly => "keyword_only",
            Self::HybridRrf => "hybrid_rrf",
            Self::HybridReranked => "hybrid_reranked",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
