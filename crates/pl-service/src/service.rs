use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use pl_core::{ChunkId, Embedder, RelevanceScorer, SearchMethod};
use pl_indexer::{IngestConfig, IngestReport};
use pl_retrieval::{Candidate, HybridSearchEngine, Reranker, SearchQuery};
use pl_storage::{StorageManager, StorageSnapshot};

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::telemetry::init_tracing;
use crate::types::{
    previews, ComparisonResponse, HealthStatus, RerankRequest, RerankResponse, RerankedItem,
    SearchRequest, SearchResponse,
};

/// Serving state: the engine over the current read-only snapshot.
struct Loaded {
    engine: Arc<HybridSearchEngine>,
    snapshot: StorageSnapshot,
}

/// Owns the search engine lifecycle and validates requests.
///
/// Construct with [`SearchService::new`], which installs the global tracing
/// subscriber in the configured log format on first use. Call
/// [`SearchService::start`] before serving, [`SearchService::reload`] after the
/// storage root changes, and [`SearchService::shutdown`] to release the stores. Reload swaps in a new
/// engine under a write lock; queries already running keep the engine they
/// started with.
pub struct SearchService {
    config: ServiceConfig,
    embedder: Arc<dyn Embedder>,
    scorer: Option<Arc<dyn RelevanceScorer>>,
    state: RwLock<Option<Loaded>>,
    /// Serializes ingestion; the stores allow one writer at a time.
    ingest_lock: Mutex<()>,
}

impl SearchService {
    pub fn new(
        config: ServiceConfig,
        embedder: Arc<dyn Embedder>,
        scorer: Option<Arc<dyn RelevanceScorer>>,
    ) -> Self {
        init_tracing(config.log_format);
        Self {
            config,
            embedder,
            scorer,
            state: RwLock::new(None),
            ingest_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Validate configuration, initialize the storage root if it is new, and
    /// load the engine.
    pub fn start(&self) -> Result<(), ServiceError> {
        self.config.validate()?;
        if self.embedder.dimension() != self.config.embedding_dim {
            return Err(ServiceError::Config {
                reason: format!(
                    "embedder produces {} dimensions, config expects {}",
                    self.embedder.dimension(),
                    self.config.embedding_dim
                ),
            });
        }

        // Creates the layout and meta.json on first start; checks the
        // dimension on later ones.
        drop(StorageManager::open_with_dimension(
            &self.config.storage_root,
            self.config.embedding_dim,
        )?);

        self.reload()?;
        tracing::info!(
            root = %self.config.storage_root.display(),
            dim = self.config.embedding_dim,
            reranker = self.scorer.is_some(),
            "search service started"
        );
        Ok(())
    }

    /// Open a fresh snapshot of the storage root and swap it in.
    pub fn reload(&self) -> Result<(), ServiceError> {
        let snapshot = StorageSnapshot::open(&self.config.storage_root)?;
        if snapshot.dimension() != self.config.embedding_dim {
            return Err(ServiceError::Config {
                reason: format!(
                    "storage root has dimension {}, config expects {}",
                    snapshot.dimension(),
                    self.config.embedding_dim
                ),
            });
        }

        let mut engine = HybridSearchEngine::from_snapshot(
            &snapshot,
            Arc::clone(&self.embedder),
            self.config.engine_config(),
        )?;
        if let Some(scorer) = &self.scorer {
            engine = engine.with_scorer(Arc::clone(scorer));
        }

        let vectors = snapshot.vector.len();
        let loaded = Loaded {
            engine: Arc::new(engine),
            snapshot,
        };
        *self.write_state()? = Some(loaded);
        tracing::info!(vectors, "engine reloaded");
        Ok(())
    }

    /// Drop the engine and its stores. Later requests fail with `NotReady`
    /// until `start` or `reload` is called again.
    pub fn shutdown(&self) -> Result<(), ServiceError> {
        let previous = self.write_state()?.take();
        if previous.is_some() {
            tracing::info!("search service shut down");
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().map(|s| s.is_some()).unwrap_or(false)
    }

    pub fn health(&self) -> Result<HealthStatus, ServiceError> {
        let state = self.read_state()?;
        let (ready, document_count, vector_count) = match state.as_ref() {
            Some(loaded) => (
                true,
                loaded.snapshot.documents.count()?,
                loaded.snapshot.vector.len(),
            ),
            None => (false, 0, 0),
        };
        Ok(HealthStatus {
            ready,
            document_count,
            vector_count,
            embedding_dim: self.config.embedding_dim,
            reranker_enabled: self.scorer.is_some(),
        })
    }

    /// Hybrid search with optional reranking.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ServiceError> {
        let k = self.validate_k(request.k, self.config.max_k)?;
        let query = validate_query(&request.query)?;
        let span = tracing::info_span!("search", k, rerank = request.use_reranking);
        let _guard = span.enter();

        let engine = self.engine()?;
        let outcome = engine.search(
            &SearchQuery::new(query)
                .with_limit(k)
                .with_reranking(request.use_reranking),
        )?;
        Ok(SearchResponse::new(
            request.query.clone(),
            outcome.hits,
            outcome.method,
            Some(outcome.metrics),
        ))
    }

    /// Nearest-neighbor search only; scores are squared L2 distances.
    pub fn vector_search(&self, query: &str, k: Option<usize>) -> Result<SearchResponse, ServiceError> {
        let k = self.validate_k(k, self.config.max_k)?;
        let text = validate_query(query)?;
        let _guard = tracing::info_span!("vector_search", k).entered();
        let hits = self.engine()?.search_vector_only(text, k)?;
        Ok(SearchResponse::new(query.to_string(), hits, SearchMethod::VectorOnly, None))
    }

    /// BM25 search only; scores are raw BM25.
    pub fn keyword_search(&self, query: &str, k: Option<usize>) -> Result<SearchResponse, ServiceError> {
        let k = self.validate_k(k, self.config.max_k)?;
        let text = validate_query(query)?;
        let _guard = tracing::info_span!("keyword_search", k).entered();
        let hits = self.engine()?.search_keyword_only(text, k)?;
        Ok(SearchResponse::new(query.to_string(), hits, SearchMethod::KeywordOnly, None))
    }

    /// Content previews from all three methods for the same query.
    pub fn compare(&self, query: &str, k: Option<usize>) -> Result<ComparisonResponse, ServiceError> {
        let k = self.validate_k(k, self.config.max_compare_k)?;
        let text = validate_query(query)?;
        let _guard = tracing::info_span!("compare", k).entered();
        let comparison = self.engine()?.compare(text, k)?;
        Ok(ComparisonResponse {
            query: query.to_string(),
            vector_only: previews(&comparison.vector_only),
            keyword_only: previews(&comparison.keyword_only),
            hybrid: previews(&comparison.hybrid),
        })
    }

    /// Rerank caller-supplied texts. Needs a relevance model but no storage.
    ///
    /// A blank query or an empty candidate list yields an empty result.
    pub fn rerank(&self, request: &RerankRequest) -> Result<RerankResponse, ServiceError> {
        let scorer = self
            .scorer
            .as_ref()
            .ok_or_else(|| ServiceError::RerankUnavailable {
                reason: "no relevance model configured".to_string(),
            })?;
        if request.query.trim().is_empty() || request.candidates.is_empty() {
            return Ok(RerankResponse {
                query: request.query.clone(),
                reranked_results: Vec::new(),
            });
        }
        let top_k = request.top_k.unwrap_or(request.candidates.len());
        if top_k == 0 {
            return Err(ServiceError::InvalidArgument {
                reason: "top_k must be at least 1".to_string(),
            });
        }

        let _guard = tracing::info_span!("rerank", candidates = request.candidates.len()).entered();
        let candidates: Vec<Candidate> = request
            .candidates
            .iter()
            .enumerate()
            .map(|(i, text)| Candidate::new(ChunkId(i as u64), text.clone()))
            .collect();
        let reranker = Reranker::new(Arc::clone(scorer))
            .with_timeout(self.config.engine_config().rerank_timeout);
        let reranked = reranker.rerank(&request.query, &candidates, top_k)?;

        let reranked_results = reranked
            .iter()
            .enumerate()
            .map(|(i, r)| RerankedItem {
                text: request.candidates[r.source_rank].clone(),
                score: r.relevance_score,
                rank: i + 1,
            })
            .collect();
        Ok(RerankResponse {
            query: request.query.clone(),
            reranked_results,
        })
    }

    /// Ingest chunk files into the storage root, then reload so new queries
    /// see them.
    pub fn ingest_and_reload(
        &self,
        source: &Path,
        config: &IngestConfig,
    ) -> Result<IngestReport, ServiceError> {
        let _lock = self.ingest_lock.lock().map_err(|e| ServiceError::NotReady {
            reason: format!("ingest lock poisoned: {e}"),
        })?;
        let report = {
            let mut storage = StorageManager::open_with_dimension(
                &self.config.storage_root,
                self.config.embedding_dim,
            )?;
            pl_indexer::ingest_path(source, &mut storage, self.embedder.as_ref(), config)?
        };
        self.reload()?;
        Ok(report)
    }

    fn engine(&self) -> Result<Arc<HybridSearchEngine>, ServiceError> {
        self.read_state()?
            .as_ref()
            .map(|loaded| Arc::clone(&loaded.engine))
            .ok_or_else(|| ServiceError::NotReady {
                reason: "engine not loaded".to_string(),
            })
    }

    fn validate_k(&self, k: Option<usize>, max: usize) -> Result<usize, ServiceError> {
        let k = k.unwrap_or(self.config.default_k.min(max));
        if k == 0 || k > max {
            return Err(ServiceError::InvalidArgument {
                reason: format!("k must be within 1..={max}, got {k}"),
            });
        }
        Ok(k)
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, Option<Loaded>>, ServiceError> {
        self.state.read().map_err(|e| ServiceError::NotReady {
            reason: format!("engine lock poisoned: {e}"),
        })
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, Option<Loaded>>, ServiceError> {
        self.state.write().map_err(|e| ServiceError::NotReady {
            reason: format!("engine lock poisoned: {e}"),
        })
    }
}

fn validate_query(query: &str) -> Result<&str, ServiceError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidArgument {
            reason: "query must not be empty".to_string(),
        });
    }
    Ok(trimmed)
}
