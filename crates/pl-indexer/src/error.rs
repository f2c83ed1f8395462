/// Indexer errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("storage error: {0}")]
    Storage(#[from] pl_storage::StorageError),

    #[error("model error: {0}")]
    Model(#[from] pl_core::ModelError),

    #[error("pipeline failed at stage '{stage}': {reason}")]
    PipelineFailed { stage: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            Self::Model(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub(crate) fn stage(stage: &str, err: impl std::fmt::Display) -> Self {
        Self::PipelineFailed {
            stage: stage.to_string(),
            reason: err.to_string(),
        }
    }
}
