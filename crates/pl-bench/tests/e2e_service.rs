use std::sync::Arc;

use pl_bench::fixture::{sample_corpus, write_jsonl, HashingEmbedder, OverlapScorer};
use pl_core::SearchMethod;
use pl_indexer::{IngestConfig, SkipReason};
use pl_service::{RerankRequest, SearchRequest, SearchService, ServiceConfig};
use pl_storage::StorageSnapshot;
use tempfile::TempDir;

const DIM: usize = 256;

#[test]
fn e2e_service_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let corpus_dir = tmp.path().join("corpus");
    write_jsonl(&corpus_dir.join("sample.jsonl"), &sample_corpus()).unwrap();

    let config = ServiceConfig::from_json(&format!(
        r#"{{"storage_root": {:?}, "embedding_dim": {DIM}, "default_k": 2}}"#,
        tmp.path().join("index").display().to_string()
    ))
    .unwrap();
    let service = SearchService::new(
        config,
        Arc::new(HashingEmbedder::new(DIM)),
        Some(Arc::new(OverlapScorer)),
    );
    service.start().unwrap();

    // --- First ingest indexes everything ---
    let first = service
        .ingest_and_reload(&corpus_dir, &IngestConfig::default())
        .unwrap();
    assert_eq!(first.records_read, 12);
    assert_eq!(first.chunks_indexed, 12);
    assert_eq!(first.embeddings_computed, 12);

    let health = service.health().unwrap();
    assert!(health.ready && health.reranker_enabled);
    assert_eq!(health.document_count, 12);
    assert_eq!(health.vector_count, 12);

    // --- Default k comes from config ---
    let resp = service
        .search(&SearchRequest::new("sinusoidal positional encodings"))
        .unwrap();
    assert_eq!(resp.total_results, 2);
    assert_eq!(resp.results[0].chunk_id, 3);
    assert_eq!(resp.results[0].arxiv_id, "1706.03762");

    let reranked = service
        .search(
            &SearchRequest::new("next sentence prediction")
                .with_k(1)
                .with_reranking(true),
        )
        .unwrap();
    assert_eq!(reranked.method, SearchMethod::HybridReranked);
    assert_eq!(reranked.results[0].chunk_id, 11);

    // --- Re-ingesting unchanged files is a no-op ---
    let second = service
        .ingest_and_reload(&corpus_dir, &IngestConfig::default())
        .unwrap();
    assert_eq!(second.chunks_indexed, 0);
    assert_eq!(second.embeddings_computed, 0);
    assert_eq!(second.skipped_for(SkipReason::Unchanged), 12);
    assert_eq!(service.health().unwrap().document_count, 12);

    let rerank = service
        .rerank(&RerankRequest {
            query: "constant error carousel".into(),
            candidates: vec![
                "residual blocks".into(),
                "constant error carousels let gradients flow".into(),
            ],
            top_k: None,
        })
        .unwrap();
    assert_eq!(rerank.reranked_results.len(), 2);
    assert_eq!(rerank.reranked_results[0].rank, 1);
    assert!(rerank.reranked_results[0].text.starts_with("constant error"));

    service.shutdown().unwrap();
    assert!(!service.is_ready());

    let snapshot = StorageSnapshot::open(&tmp.path().join("index")).unwrap();
    assert!(snapshot.check_consistency().unwrap().is_consistent());
}
