use pl_indexer::IndexerError;
use pl_retrieval::{RerankError, RetrievalError};
use pl_storage::StorageError;

/// Errors surfaced to service callers.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("service not ready: {reason}")]
    NotReady { reason: String },

    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("indexer error: {0}")]
    Indexer(#[from] IndexerError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("config error: {reason}")]
    Config { reason: String },

    #[error("rerank unavailable: {reason}")]
    RerankUnavailable { reason: String },
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotReady { .. } | Self::RerankUnavailable { .. } => true,
            Self::Retrieval(e) => e.is_retryable(),
            Self::Indexer(e) => e.is_retryable(),
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<RerankError> for ServiceError {
    fn from(err: RerankError) -> Self {
        match err {
            RerankError::InvalidArgument { reason } => Self::InvalidArgument { reason },
            other => Self::RerankUnavailable {
                reason: other.to_string(),
            },
        }
    }
}
