use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;

use pl_core::{Chunk, ChunkId, Embedder, ModelError};
use pl_storage::{StorageError, StorageManager};

use crate::error::IndexerError;
use crate::report::{IngestConfig, IngestReport, SkipReason};
use crate::scanner::scan_chunk_files;
use crate::source::{read_jsonl, ChunkRecord, SourceBatch};

/// Ingest every chunk file under `source` into the storage root at
/// `storage_root`, creating it with the embedder's dimension if needed.
pub fn index(
    source: &Path,
    storage_root: &Path,
    embedder: &dyn Embedder,
    config: &IngestConfig,
) -> Result<IngestReport, IndexerError> {
    let mut storage = StorageManager::open_with_dimension(storage_root, embedder.dimension())?;
    ingest_path(source, &mut storage, embedder, config)
}

/// Ingest every chunk file under `source` (a `.jsonl` file or a directory).
///
/// Pipeline: scan → parallel parse (rayon) → dedupe/validate → skip unchanged
/// → per batch: parallel embed, then documents → full-text → vectors.
#[tracing::instrument(skip(storage, embedder, config))]
pub fn ingest_path(
    source: &Path,
    storage: &mut StorageManager,
    embedder: &dyn Embedder,
    config: &IngestConfig,
) -> Result<IngestReport, IndexerError> {
    let start = Instant::now();
    if !source.exists() {
        return Err(IndexerError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no chunk source at {}", source.display()),
        )));
    }

    let scan = scan_chunk_files(source);
    tracing::info!(files = scan.files.len(), "ingest started");

    let parsed: Vec<(&Path, Result<SourceBatch, IndexerError>)> = scan
        .files
        .par_iter()
        .map(|path| (path.as_path(), read_jsonl(path)))
        .collect();

    let mut report = IngestReport {
        files_scanned: scan.files.len(),
        ..IngestReport::default()
    };
    let mut records = Vec::new();
    for (path, batch) in parsed {
        let batch = batch?;
        report.records_read += batch.malformed.len();
        for (line, reason) in batch.malformed {
            report.skip(SkipReason::Malformed);
            report
                .failed_details
                .push((format!("{}:{line}", path.display()), reason));
        }
        records.extend(batch.records);
    }

    ingest_records(storage, records, embedder, config, &mut report)?;
    report.duration = start.elapsed();

    tracing::info!(
        records = report.records_read,
        indexed = report.chunks_indexed,
        skipped = report.total_skipped(),
        duration_secs = %format!("{:.2}", report.duration.as_secs_f64()),
        "ingest completed"
    );
    Ok(report)
}

/// Ingest already-parsed records.
///
/// Records are upserted by id: within one call the last record for an id
/// wins, and a record whose content hash matches the stored one is skipped
/// when `skip_unchanged` is set. Each batch is written to the document store
/// first, then the full-text index, then the vector index, so every indexed id
/// resolves and a failed run can simply be repeated.
pub fn ingest(
    storage: &mut StorageManager,
    records: Vec<ChunkRecord>,
    embedder: &dyn Embedder,
    config: &IngestConfig,
) -> Result<IngestReport, IndexerError> {
    let start = Instant::now();
    let mut report = IngestReport::default();
    ingest_records(storage, records, embedder, config, &mut report)?;
    report.duration = start.elapsed();
    Ok(report)
}

fn ingest_records(
    storage: &mut StorageManager,
    records: Vec<ChunkRecord>,
    embedder: &dyn Embedder,
    config: &IngestConfig,
    report: &mut IngestReport,
) -> Result<(), IndexerError> {
    report.records_read += records.len();
    let dim = storage.dimension();
    if embedder.dimension() != dim {
        return Err(IndexerError::Storage(StorageError::DimensionMismatch {
            expected: dim,
            actual: embedder.dimension(),
        }));
    }

    let mut prepared = prepare(records, dim, report);

    if config.skip_unchanged && !prepared.is_empty() {
        let ids: Vec<ChunkId> = prepared.iter().map(|(c, _)| c.chunk_id).collect();
        let stored = storage
            .documents()
            .content_hashes(&ids)
            .map_err(|e| IndexerError::stage("load_hashes", e))?;
        let vectors = storage.vector();
        let before = prepared.len();
        prepared.retain(|(chunk, _)| {
            let unchanged = stored.get(&chunk.chunk_id) == Some(&chunk.content_hash())
                && vectors.contains(chunk.chunk_id);
            !unchanged
        });
        report.skip_many(SkipReason::Unchanged, before - prepared.len());
    }

    let (chunks, supplied): (Vec<Chunk>, Vec<Option<Vec<f32>>>) = prepared.into_iter().unzip();
    let batch_size = config.batch_size.max(1);

    for (chunk_batch, supplied_batch) in chunks.chunks(batch_size).zip(supplied.chunks(batch_size)) {
        let (vectors, computed) = embed_missing(
            chunk_batch,
            supplied_batch,
            embedder,
            config.embed_batch_size,
            dim,
        )?;

        storage
            .documents_mut()
            .put_batched(chunk_batch, batch_size)
            .map_err(|e| IndexerError::stage("store_documents", e))?;

        for chunk in chunk_batch {
            storage
                .fulltext_mut()
                .add_chunk(chunk)
                .map_err(|e| IndexerError::stage("fulltext_index", e))?;
        }

        let ids: Vec<ChunkId> = chunk_batch.iter().map(|c| c.chunk_id).collect();
        storage
            .vector_mut()
            .add(&ids, &vectors)
            .map_err(|e| IndexerError::stage("vector_index", e))?;

        report.chunks_indexed += chunk_batch.len();
        report.embeddings_computed += computed;
        tracing::debug!(batch = chunk_batch.len(), computed, "batch stored");
    }

    storage
        .flush()
        .map_err(|e| IndexerError::stage("flush", e))?;
    Ok(())
}

/// Deduplicate by id (last wins) and drop invalid records.
fn prepare(
    records: Vec<ChunkRecord>,
    dim: usize,
    report: &mut IngestReport,
) -> Vec<(Chunk, Option<Vec<f32>>)> {
    let last: HashMap<u64, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.chunk_id, i))
        .collect();

    let mut prepared = Vec::with_capacity(last.len());
    for (i, record) in records.into_iter().enumerate() {
        if last.get(&record.chunk_id) != Some(&i) {
            report.skip(SkipReason::Duplicate);
            continue;
        }
        let (chunk, embedding) = record.into_parts();
        if let Err(e) = chunk.validate() {
            report.skip(SkipReason::EmptyText);
            report
                .failed_details
                .push((format!("chunk {}", chunk.chunk_id), e.to_string()));
            continue;
        }
        if let Some(vector) = &embedding {
            if vector.len() != dim {
                tracing::warn!(
                    chunk_id = chunk.chunk_id.0,
                    expected = dim,
                    actual = vector.len(),
                    "supplied embedding has wrong dimension"
                );
                report.skip(SkipReason::DimensionMismatch);
                report.failed_details.push((
                    format!("chunk {}", chunk.chunk_id),
                    format!("embedding has {} dimensions, index expects {dim}", vector.len()),
                ));
                continue;
            }
        }
        prepared.push((chunk, embedding));
    }
    prepared
}

/// Fill in embeddings for chunks that came without one. Returns one vector
/// per chunk and the number computed.
fn embed_missing(
    chunks: &[Chunk],
    supplied: &[Option<Vec<f32>>],
    embedder: &dyn Embedder,
    embed_batch_size: usize,
    dim: usize,
) -> Result<(Vec<Vec<f32>>, usize), IndexerError> {
    let texts: Vec<&str> = chunks
        .iter()
        .zip(supplied)
        .filter(|(_, s)| s.is_none())
        .map(|(c, _)| c.text.as_str())
        .collect();

    let groups: Vec<Vec<Vec<f32>>> = texts
        .par_chunks(embed_batch_size.max(1))
        .map(|group| embedder.embed_batch(group))
        .collect::<Result<_, ModelError>>()?;
    let computed: Vec<Vec<f32>> = groups.into_iter().flatten().collect();

    if computed.len() != texts.len() {
        return Err(IndexerError::stage(
            "embed",
            format!("model returned {} vectors for {} texts", computed.len(), texts.len()),
        ));
    }
    if let Some(bad) = computed.iter().find(|v| v.len() != dim) {
        return Err(IndexerError::stage(
            "embed",
            format!("model produced {} dimensions, index expects {dim}", bad.len()),
        ));
    }

    let count = computed.len();
    let mut computed = computed.into_iter();
    let mut vectors = Vec::with_capacity(chunks.len());
    for s in supplied {
        match s {
            Some(v) => vectors.push(v.clone()),
            None => {
                let v = computed.next().ok_or_else(|| {
                    IndexerError::stage("embed", "ran out of computed embeddings")
                })?;
                vectors.push(v);
            }
        }
    }
    Ok((vectors, count))
}
