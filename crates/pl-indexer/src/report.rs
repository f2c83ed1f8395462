use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Records written to the three stores per batch (default: 256).
    pub batch_size: usize,
    /// Skip records whose stored content hash is unchanged (default: true).
    pub skip_unchanged: bool,
    /// Texts per `Embedder::embed_batch` call (default: 32).
    pub embed_batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            skip_unchanged: true,
            embed_batch_size: 32,
        }
    }
}

/// Reason why an input record was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The line was not a valid chunk record.
    Malformed,
    /// Text empty or whitespace only.
    EmptyText,
    /// A later record in the same run has the same id.
    Duplicate,
    /// Same content hash as the stored record.
    Unchanged,
    /// A supplied embedding has the wrong length.
    DimensionMismatch,
}

/// Report generated after an ingestion run.
#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub files_scanned: usize,
    pub records_read: usize,
    pub chunks_indexed: usize,
    pub embeddings_computed: usize,
    pub skipped: HashMap<SkipReason, usize>,
    /// `(location, reason)` for each malformed or rejected record.
    pub failed_details: Vec<(String, String)>,
    pub duration: Duration,
}

impl IngestReport {
    pub fn total_skipped(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }

    pub(crate) fn skip(&mut self, reason: SkipReason) {
        self.skip_many(reason, 1);
    }

    pub(crate) fn skip_many(&mut self, reason: SkipReason, count: usize) {
        if count > 0 {
            *self.skipped.entry(reason).or_insert(0) += count;
        }
    }
}
