//! Capability interfaces for the external models.
//!
//! The engine only ever talks to models through these traits, so tests and
//! benchmarks can plug in deterministic stubs.

use crate::error::ModelError;

/// Maps text to a fixed-length vector.
///
/// Implementations must be `Send + Sync`: query embedding runs on the rayon
/// pool concurrently with lexical search.
pub trait Embedder: Send + Sync {
    /// Length of every vector this model produces.
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;

    /// Embed several texts. The default calls `embed` once per text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Pairwise (query, candidate) relevance model, e.g. a cross-encoder.
///
/// Scores are only meaningful relative to each other within one call; the
/// sole contract is "higher is more relevant".
pub trait RelevanceScorer: Send + Sync {
    fn score(&self, query: &str, candidate: &str) -> Result<f32, ModelError>;

    /// Score all candidates for one query, returning one score per candidate
    /// in input order. Real models should override this with a single batched
    /// inference call.
    fn score_batch(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>, ModelError> {
        candidates.iter().map(|c| self.score(query, c)).collect()
    }
}
