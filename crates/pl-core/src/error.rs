/// Errors from pl-core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("chunk {chunk_id} has empty text")]
    EmptyText { chunk_id: u64 },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Errors raised by external model capabilities (embedding, relevance scoring).
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("model returned invalid output: {reason}")]
    InvalidOutput { reason: String },
}

impl ModelError {
    /// An unavailable model may come back; malformed output will not fix itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
