//! Offline comparison of the three retrieval methods against labelled queries.

use std::collections::HashSet;

use pl_core::ChunkId;
use serde::{Deserialize, Serialize};

use crate::engine::{HybridSearchEngine, SearchHit};
use crate::error::RetrievalError;

/// Fraction of `relevant` ids found in the first `k` of `retrieved`.
/// Zero when nothing is relevant.
pub fn recall_at_k(retrieved: &[ChunkId], relevant: &[ChunkId], k: usize) -> f64 {
    let relevant: HashSet<ChunkId> = relevant.iter().copied().collect();
    if relevant.is_empty() {
        return 0.0;
    }
    let top: HashSet<ChunkId> = retrieved.iter().take(k).copied().collect();
    top.intersection(&relevant).count() as f64 / relevant.len() as f64
}

/// 1.0 when any relevant id appears in the first `k` of `retrieved`.
pub fn hit_rate_at_k(retrieved: &[ChunkId], relevant: &[ChunkId], k: usize) -> f64 {
    if retrieved.iter().take(k).any(|id| relevant.contains(id)) {
        1.0
    } else {
        0.0
    }
}

/// A labelled query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    pub query: String,
    pub relevant: Vec<ChunkId>,
}

/// Recall and hit rate for one method on one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MethodScores {
    pub recall: f64,
    pub hit_rate: f64,
}

impl MethodScores {
    fn measure(retrieved: &[ChunkId], relevant: &[ChunkId], k: usize) -> Self {
        Self {
            recall: recall_at_k(retrieved, relevant, k),
            hit_rate: hit_rate_at_k(retrieved, relevant, k),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseScores {
    pub query: String,
    pub vector_only: MethodScores,
    pub keyword_only: MethodScores,
    pub hybrid: MethodScores,
}

/// Per-query scores and their means.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub k: usize,
    pub cases: Vec<CaseScores>,
    pub vector_only: MethodScores,
    pub keyword_only: MethodScores,
    pub hybrid: MethodScores,
}

impl EvaluationReport {
    /// Hybrid mean recall minus the better single method's mean recall.
    pub fn recall_gain(&self) -> f64 {
        self.hybrid.recall - self.vector_only.recall.max(self.keyword_only.recall)
    }

    /// Hybrid mean hit rate minus the better single method's mean hit rate.
    pub fn hit_rate_gain(&self) -> f64 {
        self.hybrid.hit_rate - self.vector_only.hit_rate.max(self.keyword_only.hit_rate)
    }
}

/// Run every case through [`HybridSearchEngine::compare`] and average the
/// scores. Cases with no relevant ids are skipped.
pub fn evaluate(
    engine: &HybridSearchEngine,
    cases: &[EvalCase],
    k: usize,
) -> Result<EvaluationReport, RetrievalError> {
    let mut report = EvaluationReport {
        k,
        ..EvaluationReport::default()
    };

    for case in cases.iter().filter(|c| !c.relevant.is_empty()) {
        let cmp = engine.compare(&case.query, k)?;
        let ids = |hits: &[SearchHit]| -> Vec<ChunkId> {
            hits.iter().map(|h| h.chunk.chunk_id).collect()
        };
        report.cases.push(CaseScores {
            query: case.query.clone(),
            vector_only: MethodScores::measure(&ids(&cmp.vector_only), &case.relevant, k),
            keyword_only: MethodScores::measure(&ids(&cmp.keyword_only), &case.relevant, k),
            hybrid: MethodScores::measure(&ids(&cmp.hybrid), &case.relevant, k),
        });
    }

    if !report.cases.is_empty() {
        let n = report.cases.len() as f64;
        let mean = |pick: fn(&CaseScores) -> MethodScores| {
            let (recall, hit_rate) = report.cases.iter().map(pick).fold((0.0, 0.0), |acc, s| {
                (acc.0 + s.recall, acc.1 + s.hit_rate)
            });
            MethodScores {
                recall: recall / n,
                hit_rate: hit_rate / n,
            }
        };
        let vector_only = mean(|c| c.vector_only);
        let keyword_only = mean(|c| c.keyword_only);
        let hybrid = mean(|c| c.hybrid);
        report.vector_only = vector_only;
        report.keyword_only = keyword_only;
        report.hybrid = hybrid;
    }

    tracing::info!(
        cases = report.cases.len(),
        k,
        hybrid_recall = report.hybrid.recall,
        recall_gain = report.recall_gain(),
        "evaluation complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> Vec<ChunkId> {
        raw.iter().copied().map(ChunkId).collect()
    }

    #[test]
    fn recall_counts_relevant_in_top_k() {
        let retrieved = ids(&[1, 2, 3, 4]);
        assert_eq!(recall_at_k(&retrieved, &ids(&[2, 4]), 2), 0.5);
        assert_eq!(recall_at_k(&retrieved, &ids(&[2, 4]), 4), 1.0);
        assert_eq!(recall_at_k(&retrieved, &ids(&[9]), 4), 0.0);
    }

    #[test]
    fn recall_ignores_duplicate_labels() {
        assert_eq!(recall_at_k(&ids(&[1]), &ids(&[1, 1]), 3), 1.0);
    }

    #[test]
    fn empty_relevant_scores_zero() {
        assert_eq!(recall_at_k(&ids(&[1]), &[], 3), 0.0);
        assert_eq!(hit_rate_at_k(&ids(&[1]), &[], 3), 0.0);
    }

    #[test]
    fn hit_rate_is_binary() {
        let retrieved = ids(&[5, 6, 7]);
        assert_eq!(hit_rate_at_k(&retrieved, &ids(&[7]), 3), 1.0);
        assert_eq!(hit_rate_at_k(&retrieved, &ids(&[7]), 2), 0.0);
    }

    #[test]
    fn gains_compare_against_best_single_method() {
        let report = EvaluationReport {
            k: 3,
            cases: Vec::new(),
            vector_only: MethodScores {
                recall: 0.4,
                hit_rate: 0.5,
            },
            keyword_only: MethodScores {
                recall: 0.6,
                hit_rate: 0.5,
            },
            hybrid: MethodScores {
                recall: 0.7,
                hit_rate: 1.0,
            },
        };
        assert!((report.recall_gain() - 0.1).abs() < 1e-12);
        assert!((report.hit_rate_gain() - 0.5).abs() < 1e-12);
    }
}
