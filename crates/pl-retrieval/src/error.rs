use std::time::Duration;

use pl_core::ModelError;
use pl_storage::StorageError;

/// Retrieval errors.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("retrieval unavailable: {reason}")]
    RetrievalUnavailable { reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl RetrievalError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            Self::RetrievalUnavailable { .. } => true,
            Self::InvalidArgument { .. } => false,
        }
    }
}

/// Reranking errors. The engine recovers from all of them by keeping the
/// fused order.
#[derive(Debug, thiserror::Error)]
pub enum RerankError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("relevance model failed: {0}")]
    Model(#[from] ModelError),

    #[error("reranking timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("relevance model returned invalid output: {reason}")]
    InvalidOutput { reason: String },
}

impl RerankError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Model(e) => e.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}
