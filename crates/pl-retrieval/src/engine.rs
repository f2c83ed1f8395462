use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use pl_core::{
    Chunk, ChunkId, Embedder, FusedResult, RelevanceScorer, ScoredResult, SearchMethod,
};
use pl_storage::{StorageError, StorageSnapshot};
use serde::Serialize;

use crate::error::RetrievalError;
use crate::fusion::{RankFuser, RRF_K};
use crate::index::{DocumentSource, LexicalIndex, VectorIndex};
use crate::rerank::{Candidate, Reranker, DEFAULT_RERANK_TIMEOUT};

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Each first-stage search asks for `k * overfetch_factor` candidates.
    pub overfetch_factor: usize,
    /// How many fused candidates are handed to the reranker (at least `k`).
    pub rerank_pool_size: usize,
    pub rrf_k: f64,
    /// Deadline for the concurrent first stage.
    pub search_timeout: Duration,
    /// Deadline for one batched reranking call.
    pub rerank_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: 2,
            rerank_pool_size: 10,
            rrf_k: RRF_K,
            search_timeout: Duration::from_secs(2),
            rerank_timeout: DEFAULT_RERANK_TIMEOUT,
        }
    }
}

/// A hybrid search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub limit: usize,
    pub use_reranking: bool,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: 3,
            use_reranking: false,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_reranking(mut self, enabled: bool) -> Self {
        self.use_reranking = enabled;
        self
    }
}

/// One resolved result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Fused RRF score, reranker relevance, or the single method's native
    /// score, depending on how the hit was produced.
    pub score: f64,
    pub vector_rank: Option<usize>,
    pub lexical_rank: Option<usize>,
}

/// Per-query counters and stage timings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchMetrics {
    pub vector_candidates: usize,
    pub lexical_candidates: usize,
    pub fused_candidates: usize,
    pub reranked: bool,
    pub missing_documents: usize,
    pub first_stage_ms: f64,
    pub rerank_ms: f64,
    pub total_ms: f64,
}

/// Result of [`HybridSearchEngine::search`].
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub method: SearchMethod,
    pub hits: Vec<SearchHit>,
    pub metrics: SearchMetrics,
}

/// Side-by-side result lists for one query.
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    pub vector_only: Vec<SearchHit>,
    pub keyword_only: Vec<SearchHit>,
    pub hybrid: Vec<SearchHit>,
}

/// Outcome of one first-stage method.
type StageResult = Result<Vec<ScoredResult>, String>;

enum StageMessage {
    Vector(StageResult),
    Lexical(StageResult),
}

struct FirstStage {
    vector: StageResult,
    lexical: StageResult,
    elapsed: Duration,
}

/// Hybrid retrieval over a vector index and a lexical index.
///
/// Both first-stage searches run concurrently on the rayon pool. Their ranked
/// lists are merged with Reciprocal Rank Fusion, resolved against the
/// document store, and optionally reordered by a relevance model. A failing
/// method degrades the query to the other one; only the loss of both is an
/// error.
pub struct HybridSearchEngine {
    vector: Arc<dyn VectorIndex>,
    lexical: Arc<dyn LexicalIndex>,
    documents: Arc<dyn DocumentSource>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Reranker>,
    fuser: RankFuser,
    config: EngineConfig,
}

impl HybridSearchEngine {
    pub fn new(
        vector: Arc<dyn VectorIndex>,
        lexical: Arc<dyn LexicalIndex>,
        documents: Arc<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
        config: EngineConfig,
    ) -> Result<Self, RetrievalError> {
        let fuser = RankFuser::new(config.rrf_k)?;
        if config.overfetch_factor == 0 {
            return Err(RetrievalError::InvalidArgument {
                reason: "overfetch_factor must be at least 1".to_string(),
            });
        }
        if embedder.dimension() != vector.dimension() {
            tracing::warn!(
                embedder_dim = embedder.dimension(),
                index_dim = vector.dimension(),
                "embedder and vector index disagree on dimension; vector search will fail"
            );
        }
        Ok(Self {
            vector,
            lexical,
            documents,
            embedder,
            reranker: None,
            fuser,
            config,
        })
    }

    /// Build an engine over a read-only storage snapshot.
    pub fn from_snapshot(
        snapshot: &StorageSnapshot,
        embedder: Arc<dyn Embedder>,
        config: EngineConfig,
    ) -> Result<Self, RetrievalError> {
        Self::new(
            snapshot.vector.clone(),
            snapshot.fulltext.clone(),
            snapshot.documents.clone(),
            embedder,
            config,
        )
    }

    /// Enable reranking with the given relevance model.
    pub fn with_scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.reranker = Some(Reranker::new(scorer).with_timeout(self.config.rerank_timeout));
        self
    }

    pub fn reranker(&self) -> Option<&Reranker> {
        self.reranker.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a hybrid search.
    ///
    /// The reported method is `hybrid_reranked` when reranking succeeded,
    /// otherwise `hybrid_rrf`, or `vector_only` / `keyword_only` when one
    /// first-stage method failed.
    #[tracing::instrument(
        skip(self, query),
        fields(limit = query.limit, rerank = query.use_reranking, method, result_count)
    )]
    pub fn search(&self, query: &SearchQuery) -> Result<SearchOutcome, RetrievalError> {
        let k = validate_k(query.limit)?;
        let start = Instant::now();
        let mut metrics = SearchMetrics::default();

        let pool = k.saturating_mul(self.config.overfetch_factor);
        let first = self.first_stage(&query.text, pool);
        metrics.first_stage_ms = millis(first.elapsed);

        let (vector, lexical, mut method) = match (first.vector, first.lexical) {
            (Ok(v), Ok(l)) => (v, l, SearchMethod::HybridRrf),
            (Ok(v), Err(e)) => {
                tracing::warn!(error = %e, "lexical search failed, serving vector results only");
                (v, Vec::new(), SearchMethod::VectorOnly)
            }
            (Err(e), Ok(l)) => {
                tracing::warn!(error = %e, "vector search failed, serving keyword results only");
                (Vec::new(), l, SearchMethod::KeywordOnly)
            }
            (Err(ve), Err(le)) => {
                return Err(RetrievalError::RetrievalUnavailable {
                    reason: format!("vector search: {ve}; lexical search: {le}"),
                });
            }
        };
        metrics.vector_candidates = vector.len();
        metrics.lexical_candidates = lexical.len();

        let reranker = self.reranker.as_ref().filter(|_| query.use_reranking);
        let fuse_k = match reranker {
            Some(_) => self.config.rerank_pool_size.max(k),
            None => k,
        };
        let fused = self.fuser.fuse(&vector, &lexical, fuse_k)?;
        metrics.fused_candidates = fused.len();

        let (mut hits, missing) = self.resolve_fused(&fused)?;
        metrics.missing_documents = missing;

        if let Some(reranker) = reranker {
            let rerank_start = Instant::now();
            let candidates: Vec<Candidate> = hits
                .iter()
                .map(|h| Candidate::new(h.chunk.chunk_id, h.chunk.text.clone()))
                .collect();
            match reranker.rerank(&query.text, &candidates, k) {
                Ok(reranked) => {
                    let mut by_position: Vec<Option<SearchHit>> =
                        hits.into_iter().map(Some).collect();
                    hits = reranked
                        .iter()
                        .filter_map(|r| {
                            let mut hit = by_position.get_mut(r.source_rank)?.take()?;
                            hit.score = f64::from(r.relevance_score);
                            Some(hit)
                        })
                        .collect();
                    method = SearchMethod::HybridReranked;
                    metrics.reranked = true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "reranking failed, keeping fused order");
                }
            }
            metrics.rerank_ms = millis(rerank_start.elapsed());
        }
        hits.truncate(k);
        metrics.total_ms = millis(start.elapsed());

        let span = tracing::Span::current();
        span.record("method", method.as_str());
        span.record("result_count", hits.len());
        tracing::debug!(
            vector = metrics.vector_candidates,
            lexical = metrics.lexical_candidates,
            fused = metrics.fused_candidates,
            total_ms = metrics.total_ms,
            "search complete"
        );

        Ok(SearchOutcome {
            method,
            hits,
            metrics,
        })
    }

    /// Nearest-neighbor search only. Scores are squared L2 distances.
    #[tracing::instrument(skip(self, text), fields(result_count))]
    pub fn search_vector_only(&self, text: &str, k: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        let k = validate_k(k)?;
        let results = embed_and_search(self.embedder.as_ref(), self.vector.as_ref(), text, k)
            .map_err(|reason| RetrievalError::RetrievalUnavailable { reason })?;
        let hits = self.resolve_single(&results, true)?;
        tracing::Span::current().record("result_count", hits.len());
        Ok(hits)
    }

    /// BM25 search only. Scores are raw BM25.
    #[tracing::instrument(skip(self, text), fields(result_count))]
    pub fn search_keyword_only(&self, text: &str, k: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        let k = validate_k(k)?;
        let results = self
            .lexical
            .search(text, k)
            .map_err(|e| RetrievalError::RetrievalUnavailable {
                reason: e.to_string(),
            })?;
        let hits = self.resolve_single(&results, false)?;
        tracing::Span::current().record("result_count", hits.len());
        Ok(hits)
    }

    /// Vector-only, keyword-only and hybrid results for the same query, from a
    /// single concurrent first stage.
    ///
    /// A failed method yields an empty list; only the loss of both is an
    /// error. The hybrid list is never reranked.
    pub fn compare(&self, text: &str, k: usize) -> Result<Comparison, RetrievalError> {
        let k = validate_k(k)?;
        let first = self.first_stage(text, k.saturating_mul(self.config.overfetch_factor));

        let (vector, lexical) = match (first.vector, first.lexical) {
            (Err(ve), Err(le)) => {
                return Err(RetrievalError::RetrievalUnavailable {
                    reason: format!("vector search: {ve}; lexical search: {le}"),
                });
            }
            (v, l) => (
                v.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "vector search failed during comparison");
                    Vec::new()
                }),
                l.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "lexical search failed during comparison");
                    Vec::new()
                }),
            ),
        };

        let fused = self.fuser.fuse(&vector, &lexical, k)?;
        let (hybrid, _) = self.resolve_fused(&fused)?;
        let vector_top = &vector[..vector.len().min(k)];
        let lexical_top = &lexical[..lexical.len().min(k)];

        Ok(Comparison {
            vector_only: self.resolve_single(vector_top, true)?,
            keyword_only: self.resolve_single(lexical_top, false)?,
            hybrid,
        })
    }

    /// Run both first-stage searches concurrently and wait for them until the
    /// search deadline.
    fn first_stage(&self, text: &str, pool: usize) -> FirstStage {
        let start = Instant::now();
        let (tx, rx) = crossbeam_channel::bounded(2);
        let cancelled = Arc::new(AtomicBool::new(false));

        {
            let tx = tx.clone();
            let cancelled = Arc::clone(&cancelled);
            let embedder = Arc::clone(&self.embedder);
            let vector = Arc::clone(&self.vector);
            let text = text.to_owned();
            rayon::spawn(move || {
                if cancelled.load(Ordering::Acquire) {
                    return;
                }
                let result = embed_and_search(embedder.as_ref(), vector.as_ref(), &text, pool);
                let _ = tx.send(StageMessage::Vector(result));
            });
        }
        {
            let cancelled = Arc::clone(&cancelled);
            let lexical = Arc::clone(&self.lexical);
            let text = text.to_owned();
            rayon::spawn(move || {
                if cancelled.load(Ordering::Acquire) {
                    return;
                }
                let result = lexical.search(&text, pool).map_err(|e| e.to_string());
                let _ = tx.send(StageMessage::Lexical(result));
            });
        }

        let deadline = start + self.config.search_timeout;
        let mut vector = None;
        let mut lexical = None;
        while vector.is_none() || lexical.is_none() {
            match rx.recv_deadline(deadline) {
                Ok(StageMessage::Vector(r)) => vector = Some(r),
                Ok(StageMessage::Lexical(r)) => lexical = Some(r),
                Err(RecvTimeoutError::Timeout) => {
                    cancelled.store(true, Ordering::Release);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let timeout = self.config.search_timeout;
        let missing = || format!("no result within {timeout:?}");
        FirstStage {
            vector: vector.unwrap_or_else(|| Err(missing())),
            lexical: lexical.unwrap_or_else(|| Err(missing())),
            elapsed: start.elapsed(),
        }
    }

    /// Resolve fused ids in order, returning the hits and the number of ids
    /// with no stored document.
    fn resolve_fused(&self, fused: &[FusedResult]) -> Result<(Vec<SearchHit>, usize), RetrievalError> {
        let ids: Vec<ChunkId> = fused.iter().map(|f| f.chunk_id).collect();
        let mut chunks = self.fetch(&ids)?;

        let hits: Vec<SearchHit> = fused
            .iter()
            .filter_map(|f| {
                chunks.remove(&f.chunk_id).map(|chunk| SearchHit {
                    chunk,
                    score: f.fused_score,
                    vector_rank: f.vector_rank,
                    lexical_rank: f.lexical_rank,
                })
            })
            .collect();

        let missing = fused.len() - hits.len();
        if missing > 0 {
            tracing::warn!(missing, "indexed chunk ids have no stored document");
        }
        Ok((hits, missing))
    }

    fn resolve_single(
        &self,
        results: &[ScoredResult],
        from_vector: bool,
    ) -> Result<Vec<SearchHit>, RetrievalError> {
        let ids: Vec<ChunkId> = results.iter().map(|r| r.chunk_id).collect();
        let mut chunks = self.fetch(&ids)?;

        let hits: Vec<SearchHit> = results
            .iter()
            .filter_map(|r| {
                chunks.remove(&r.chunk_id).map(|chunk| SearchHit {
                    chunk,
                    score: f64::from(r.score),
                    vector_rank: from_vector.then_some(r.rank),
                    lexical_rank: (!from_vector).then_some(r.rank),
                })
            })
            .collect();

        if hits.len() < results.len() {
            tracing::warn!(
                missing = results.len() - hits.len(),
                "indexed chunk ids have no stored document"
            );
        }
        Ok(hits)
    }

    fn fetch(&self, ids: &[ChunkId]) -> Result<HashMap<ChunkId, Chunk>, RetrievalError> {
        let chunks = self
            .documents
            .get(ids)
            .map_err(|e: StorageError| RetrievalError::RetrievalUnavailable {
                reason: format!("document store: {e}"),
            })?;
        Ok(chunks.into_iter().map(|c| (c.chunk_id, c)).collect())
    }
}

fn validate_k(k: usize) -> Result<usize, RetrievalError> {
    if k == 0 {
        return Err(RetrievalError::InvalidArgument {
            reason: "k must be at least 1".to_string(),
        });
    }
    Ok(k)
}

/// Embed `text` and search the vector index. Any failure, including a model
/// vector of the wrong length, is reported as a reason string.
fn embed_and_search(
    embedder: &dyn Embedder,
    vector: &dyn VectorIndex,
    text: &str,
    k: usize,
) -> StageResult {
    let embedding = embedder
        .embed(text)
        .map_err(|e| format!("embedding failed: {e}"))?;
    if embedding.len() != vector.dimension() {
        return Err(format!(
            "embedding has {} dimensions, index expects {}",
            embedding.len(),
            vector.dimension()
        ));
    }
    vector.search(&embedding, k).map_err(|e| e.to_string())
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
