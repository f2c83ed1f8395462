use pl_core::{ChunkId, Embedder, ModelError};
use pl_indexer::{index, IngestConfig, SkipReason};
use pl_storage::{StorageManager, StorageSnapshot};
use std::fs;
use tempfile::TempDir;

struct LengthEmbedder;

impl Embedder for LengthEmbedder {
    fn dimension(&self) -> usize {
        2
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        Ok(vec![text.len() as f32, text.split_whitespace().count() as f32])
    }
}

fn create_fixture_corpus(root: &std::path::Path) {
    let papers = root.join("papers");
    fs::create_dir_all(&papers).unwrap();
    fs::write(
        papers.join("transformer.jsonl"),
        r#"{"chunk_id": 1, "text": "The Transformer uses multi-head self-attention.", "paper_title": "Attention Is All You Need", "authors": "Vaswani et al.", "year": 2017, "arxiv_id": "1706.03762", "source_pdf": "1706.03762.pdf"}
{"chunk_id": 2, "text": "Positional encodings inject token order.", "paper_title": "Attention Is All You Need", "authors": "Vaswani et al.", "year": 2017, "arxiv_id": "1706.03762", "source_pdf": "1706.03762.pdf"}
"#,
    )
    .unwrap();
    fs::write(
        papers.join("resnet.jsonl"),
        r#"{"chunk_id": 3, "text": "Residual learning eases training of very deep networks.", "paper_title": "Deep Residual Learning", "authors": "He et al.", "year": 2015, "arxiv_id": "1512.03385", "source_pdf": "1512.03385.pdf"}
this line is not json
{"chunk_id": 4, "text": "", "paper_title": "Empty"}
"#,
    )
    .unwrap();
    fs::write(papers.join("README.md"), "not a chunk file").unwrap();
}

#[test]
fn index_directory_into_storage_root() {
    let corpus = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    create_fixture_corpus(corpus.path());

    let report = index(
        corpus.path(),
        store.path(),
        &LengthEmbedder,
        &IngestConfig::default(),
    )
    .unwrap();

    assert_eq!(report.files_scanned, 2);
    assert_eq!(report.records_read, 5);
    assert_eq!(report.chunks_indexed, 3);
    assert_eq!(report.skipped_for(SkipReason::Malformed), 1);
    assert_eq!(report.skipped_for(SkipReason::EmptyText), 1);
    assert_eq!(report.failed_details.len(), 2);
    assert!(
        report.failed_details[0].0.ends_with("resnet.jsonl:2"),
        "{:?}",
        report.failed_details
    );

    let snapshot = StorageSnapshot::open(store.path()).unwrap();
    assert_eq!(snapshot.dimension(), 2);
    assert!(snapshot.check_consistency().unwrap().is_consistent());
    assert_eq!(snapshot.documents.count().unwrap(), 3);

    let hits = snapshot.fulltext.search_bm25("residual", 5).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_id, ChunkId(3));

    // Title and authors are searchable too.
    let hits = snapshot.fulltext.search_bm25("vaswani", 5).unwrap();
    assert_eq!(hits.len(), 2);

    let chunk = snapshot.documents.get_one(ChunkId(1)).unwrap().unwrap();
    assert_eq!(chunk.arxiv_id, "1706.03762");
    assert_eq!(chunk.year, Some(2017));
}

#[test]
fn second_run_skips_unchanged_records() {
    let corpus = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    create_fixture_corpus(corpus.path());

    index(corpus.path(), store.path(), &LengthEmbedder, &IngestConfig::default()).unwrap();
    let second = index(corpus.path(), store.path(), &LengthEmbedder, &IngestConfig::default())
        .unwrap();

    assert_eq!(second.chunks_indexed, 0);
    assert_eq!(second.skipped_for(SkipReason::Unchanged), 3);

    let storage = StorageManager::open(store.path()).unwrap();
    assert_eq!(storage.documents().count().unwrap(), 3);
    assert_eq!(storage.vector().len(), 3);
}

#[test]
fn single_file_source() {
    let corpus = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    create_fixture_corpus(corpus.path());

    let report = index(
        &corpus.path().join("papers").join("transformer.jsonl"),
        store.path(),
        &LengthEmbedder,
        &IngestConfig::default(),
    )
    .unwrap();
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.chunks_indexed, 2);
}
