pub mod error;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod source;

pub use error::IndexerError;
pub use pipeline::{index, ingest, ingest_path};
pub use report::{IngestConfig, IngestReport, SkipReason};
pub use scanner::{scan_chunk_files, ScanResult};
pub use source::{parse_jsonl, read_jsonl, ChunkRecord, SourceBatch};
