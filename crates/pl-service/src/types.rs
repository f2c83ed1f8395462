use pl_core::{preview, SearchMethod};
use pl_retrieval::{SearchHit, SearchMetrics};
use serde::{Deserialize, Serialize};

/// Characters of chunk text shown per entry in a comparison.
pub const PREVIEW_CHARS: usize = 200;

/// A search request. `k` falls back to the configured default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub use_reranking: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            k: None,
            use_reranking: false,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    pub fn with_reranking(mut self, enabled: bool) -> Self {
        self.use_reranking = enabled;
        self
    }
}

/// One resolved chunk in a search response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResultItem {
    pub chunk_id: u64,
    pub content: String,
    pub paper_title: String,
    pub authors: String,
    pub year: Option<i32>,
    pub arxiv_id: String,
    pub source_pdf: String,
    pub score: f64,
    pub method: SearchMethod,
}

impl SearchResultItem {
    pub fn from_hit(hit: SearchHit, method: SearchMethod) -> Self {
        let chunk = hit.chunk;
        Self {
            chunk_id: chunk.chunk_id.0,
            content: chunk.text,
            paper_title: chunk.paper_title,
            authors: chunk.authors,
            year: chunk.year,
            arxiv_id: chunk.arxiv_id,
            source_pdf: chunk.source_pdf,
            score: hit.score,
            method,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResultItem>,
    pub total_results: usize,
    pub method: SearchMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SearchMetrics>,
}

impl SearchResponse {
    pub(crate) fn new(
        query: String,
        hits: Vec<SearchHit>,
        method: SearchMethod,
        metrics: Option<SearchMetrics>,
    ) -> Self {
        let results: Vec<SearchResultItem> = hits
            .into_iter()
            .map(|h| SearchResultItem::from_hit(h, method))
            .collect();
        Self {
            query,
            total_results: results.len(),
            results,
            method,
            metrics,
        }
    }
}

/// Content previews from each method for the same query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResponse {
    pub query: String,
    pub vector_only: Vec<String>,
    pub keyword_only: Vec<String>,
    pub hybrid: Vec<String>,
}

pub(crate) fn previews(hits: &[SearchHit]) -> Vec<String> {
    hits.iter()
        .map(|h| preview(&h.chunk.text, PREVIEW_CHARS))
        .collect()
}

/// Standalone reranking of caller-supplied texts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankRequest {
    pub query: String,
    pub candidates: Vec<String>,
    /// Defaults to returning every candidate.
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankedItem {
    pub text: String,
    pub score: f32,
    /// 1-based.
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankResponse {
    pub query: String,
    pub reranked_results: Vec<RerankedItem>,
}

/// Readiness and corpus size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub ready: bool,
    pub document_count: usize,
    pub vector_count: usize,
    pub embedding_dim: usize,
    pub reranker_enabled: bool,
}
