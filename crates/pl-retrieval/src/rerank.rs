use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use pl_core::{ChunkId, ModelError, RelevanceScorer, RerankedResult};

use crate::error::RerankError;

/// Default budget for one batched scoring call.
pub const DEFAULT_RERANK_TIMEOUT: Duration = Duration::from_secs(5);

/// A reranking input: an id and the text the model should read.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub chunk_id: ChunkId,
    pub text: String,
}

impl Candidate {
    pub fn new(chunk_id: ChunkId, text: impl Into<String>) -> Self {
        Self {
            chunk_id,
            text: text.into(),
        }
    }
}

/// Re-scores a candidate list with a pairwise relevance model.
///
/// Each call makes exactly one `score_batch` call on the rayon pool and waits
/// at most `timeout` for it. Scores are only compared within that call.
#[derive(Clone)]
pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
    timeout: Duration,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self {
            scorer,
            timeout: DEFAULT_RERANK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Reorder `candidates` by relevance to `query` and keep the top `final_k`.
    ///
    /// Output ids are a subset of the input ids. Equal scores keep input order;
    /// NaN scores sort last. An empty candidate list returns immediately
    /// without calling the model.
    pub fn rerank(
        &self,
        query: &str,
        candidates: &[Candidate],
        final_k: usize,
    ) -> Result<Vec<RerankedResult>, RerankError> {
        self.rerank_inner(query, candidates, final_k, None)
    }

    /// Like [`Reranker::rerank`], but drops results scoring below `min_score`.
    pub fn rerank_with_cutoff(
        &self,
        query: &str,
        candidates: &[Candidate],
        final_k: usize,
        min_score: f32,
    ) -> Result<Vec<RerankedResult>, RerankError> {
        self.rerank_inner(query, candidates, final_k, Some(min_score))
    }

    #[tracing::instrument(skip(self, query, candidates), fields(candidates = candidates.len()))]
    fn rerank_inner(
        &self,
        query: &str,
        candidates: &[Candidate],
        final_k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<RerankedResult>, RerankError> {
        if final_k == 0 {
            return Err(RerankError::InvalidArgument {
                reason: "final_k must be at least 1".to_string(),
            });
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let scores = self.score_batch(query, candidates)?;
        if scores.len() != candidates.len() {
            return Err(RerankError::InvalidOutput {
                reason: format!(
                    "expected {} scores, got {}",
                    candidates.len(),
                    scores.len()
                ),
            });
        }

        let mut results: Vec<RerankedResult> = candidates
            .iter()
            .zip(scores)
            .enumerate()
            .map(|(source_rank, (candidate, relevance_score))| RerankedResult {
                chunk_id: candidate.chunk_id,
                relevance_score,
                source_rank,
            })
            .collect();
        if let Some(min) = min_score {
            results.retain(|r| r.relevance_score >= min);
        }
        results.sort_by(relevance_cmp);
        results.truncate(final_k);

        tracing::debug!(
            kept = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "reranked"
        );
        Ok(results)
    }

    /// Run one batched scoring call on the rayon pool under the timeout.
    fn score_batch(&self, query: &str, candidates: &[Candidate]) -> Result<Vec<f32>, RerankError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let scorer = Arc::clone(&self.scorer);
        let query = query.to_owned();
        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();

        rayon::spawn(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let _ = tx.send(scorer.score_batch(&query, &refs));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => Ok(result?),
            Err(RecvTimeoutError::Timeout) => Err(RerankError::Timeout {
                timeout: self.timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(RerankError::Model(ModelError::Unavailable {
                reason: "scoring task ended without a result".to_string(),
            })),
        }
    }
}

/// Higher relevance first, NaN last, ties by input position.
fn relevance_cmp(a: &RerankedResult, b: &RerankedResult) -> Ordering {
    let by_score = match (a.relevance_score.is_nan(), b.relevance_score.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b
            .relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(Ordering::Equal),
    };
    by_score.then_with(|| a.source_rank.cmp(&b.source_rank))
}
