pub mod engine;
pub mod error;
pub mod evaluation;
pub mod fusion;
pub mod index;
pub mod rerank;

pub use engine::{
    Comparison, EngineConfig, HybridSearchEngine, SearchHit, SearchMetrics, SearchOutcome,
    SearchQuery,
};
pub use error::{RerankError, RetrievalError};
pub use evaluation::{
    evaluate, hit_rate_at_k, recall_at_k, CaseScores, EvalCase, EvaluationReport, MethodScores,
};
pub use fusion::{rrf_score, RankFuser, RRF_K};
pub use index::{DocumentSource, LexicalIndex, VectorIndex};
pub use rerank::{Candidate, Reranker};
