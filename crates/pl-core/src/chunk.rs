use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::CoreError;

/// Stable integer identifier of a retrievable chunk.
///
/// The same id keys the document store, the lexical index and the vector
/// index (where it is used directly as the usearch key).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(pub u64);

impl ChunkId {
    /// SQLite stores integers as i64; ids round-trip through the bit pattern.
    pub fn to_sql(self) -> i64 {
        self.0 as i64
    }

    pub fn from_sql(value: i64) -> Self {
        Self(value as u64)
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.0)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChunkId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A unit of retrievable paper text with its paper metadata.
///
/// Created once during ingestion and never mutated afterwards; re-ingesting a
/// chunk with the same id replaces the stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub text: String,
    #[serde(default)]
    pub paper_title: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub arxiv_id: String,
    #[serde(default)]
    pub source_pdf: String,
}

impl Chunk {
    /// Create a chunk with empty metadata.
    pub fn new(chunk_id: ChunkId, text: impl Into<String>) -> Self {
        Self {
            chunk_id,
            text: text.into(),
            paper_title: String::new(),
            authors: String::new(),
            year: None,
            arxiv_id: String::new(),
            source_pdf: String::new(),
        }
    }

    /// Reject chunks whose text is empty or whitespace only.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.text.trim().is_empty() {
            return Err(CoreError::EmptyText {
                chunk_id: self.chunk_id.0,
            });
        }
        Ok(())
    }

    /// XXH3-64 over the text and every metadata field.
    ///
    /// Two records with the same hash are treated as identical by ingestion.
    pub fn content_hash(&self) -> u64 {
        let year = self.year.map(|y| y.to_string()).unwrap_or_default();
        let input = format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
            self.text, self.paper_title, self.authors, year, self.arxiv_id, self.source_pdf
        );
        xxh3_64(input.as_bytes())
    }
}
