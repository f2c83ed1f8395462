use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use pl_core::{Chunk, ChunkId};
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// One line of a chunk JSONL file.
///
/// Metadata fields are optional; `embedding` is computed at ingestion when
/// absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: u64,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl ChunkRecord {
    /// Split into the stored chunk and the precomputed embedding, if any.
    pub fn into_parts(self) -> (Chunk, Option<Vec<f32>>) {
        let chunk = Chunk {
            chunk_id: ChunkId(self.chunk_id),
            text: self.text,
            paper_title: self.paper_title,
            authors: self.authors,
            year: self.year,
            arxiv_id: self.arxiv_id,
            source_pdf: self.source_pdf,
        };
        (chunk, self.embedding)
    }
}

impl From<&Chunk> for ChunkRecord {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id.0,
            text: chunk.text.clone(),
            paper_title: chunk.paper_title.clone(),
            authors: chunk.authors.clone(),
            year: chunk.year,
            arxiv_id: chunk.arxiv_id.clone(),
            source_pdf: chunk.source_pdf.clone(),
            embedding: None,
        }
    }
}

/// Records parsed from one source, plus the lines that could not be parsed.
#[derive(Debug, Default)]
pub struct SourceBatch {
    pub records: Vec<ChunkRecord>,
    /// `(1-based line number, parse error)`.
    pub malformed: Vec<(usize, String)>,
}

/// Parse chunk records, one JSON object per line.
///
/// Blank lines are ignored. A line that fails to parse is recorded in
/// `malformed` and does not abort the read; an I/O error does.
pub fn parse_jsonl(reader: impl BufRead) -> Result<SourceBatch, IndexerError> {
    let mut batch = SourceBatch::default();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ChunkRecord>(trimmed) {
            Ok(record) => batch.records.push(record),
            Err(e) => batch.malformed.push((i + 1, e.to_string())),
        }
    }
    Ok(batch)
}

/// Read and parse a chunk JSONL file.
pub fn read_jsonl(path: &Path) -> Result<SourceBatch, IndexerError> {
    let file = File::open(path)?;
    let batch = parse_jsonl(BufReader::new(file))?;
    if !batch.malformed.is_empty() {
        tracing::warn!(
            path = %path.display(),
            malformed = batch.malformed.len(),
            "skipped malformed chunk records"
        );
    }
    Ok(batch)
}
