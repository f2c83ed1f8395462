/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("vector index unavailable: {reason}")]
    VectorIndexUnavailable { reason: String },

    #[error("full-text index unavailable: {reason}")]
    FullTextIndexUnavailable { reason: String },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("{store} store was opened read-only")]
    ReadOnly { store: &'static str },

    /// Another writer holds the storage root.
    #[error("storage root is locked by another writer: {reason}")]
    Locked { reason: String },

    #[error("lock poisoned: {reason}")]
    LockPoisoned { reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema version mismatch: expected {expected}, found {actual}")]
    SchemaMismatch { expected: u32, actual: u32 },
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Sqlite(e) => is_sqlite_busy(e),
            Self::Locked { .. } => true,
            _ => false,
        }
    }
}

fn is_sqlite_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::DatabaseBusy,
                ..
            },
            _
        )
    )
}
