use std::sync::Arc;

use pl_bench::fixture::{sample_corpus, write_jsonl, HashingEmbedder, OverlapScorer};
use pl_core::{ChunkId, SearchMethod};
use pl_indexer::{index, IngestConfig};
use pl_retrieval::{evaluate, EngineConfig, EvalCase, HybridSearchEngine, SearchQuery};
use pl_storage::StorageSnapshot;
use tempfile::TempDir;

const DIM: usize = 256;

fn indexed() -> (TempDir, StorageSnapshot) {
    let tmp = TempDir::new().unwrap();
    let corpus = sample_corpus();
    write_jsonl(&tmp.path().join("papers").join("part1.jsonl"), &corpus[..6]).unwrap();
    write_jsonl(&tmp.path().join("papers").join("part2.jsonl"), &corpus[6..]).unwrap();

    let root = tmp.path().join("index");
    let report = index(
        &tmp.path().join("papers"),
        &root,
        &HashingEmbedder::new(DIM),
        &IngestConfig::default(),
    )
    .unwrap();
    assert_eq!(report.files_scanned, 2);
    assert_eq!(report.chunks_indexed, 12, "failed: {:?}", report.failed_details);

    let snapshot = StorageSnapshot::open(&root).unwrap();
    (tmp, snapshot)
}

fn engine(snapshot: &StorageSnapshot) -> HybridSearchEngine {
    HybridSearchEngine::from_snapshot(
        snapshot,
        Arc::new(HashingEmbedder::new(DIM)),
        EngineConfig::default(),
    )
    .unwrap()
}

#[test]
fn e2e_index_then_hybrid_search() {
    let (_tmp, snapshot) = indexed();
    assert_eq!(snapshot.dimension(), DIM);
    let consistency = snapshot.check_consistency().unwrap();
    assert!(consistency.is_consistent());
    assert_eq!(consistency.document_count, 12);
    assert_eq!(consistency.vector_count, 12);
    assert_eq!(consistency.fulltext_count, 12);

    let engine = engine(&snapshot);

    // --- Distinctive vocabulary lands at the top ---
    let outcome = engine
        .search(&SearchQuery::new("LSTM memory cells gating units"))
        .unwrap();
    assert_eq!(outcome.method, SearchMethod::HybridRrf);
    assert_eq!(outcome.hits.len(), 3);
    let top = &outcome.hits[0];
    assert_eq!(top.chunk.chunk_id, ChunkId(6));
    assert_eq!(top.chunk.paper_title, "Long Short-Term Memory");
    assert_eq!(top.chunk.year, Some(1997));
    assert!(top.vector_rank.is_some() && top.lexical_rank.is_some());

    // --- Metrics are filled ---
    assert_eq!(outcome.metrics.missing_documents, 0);
    assert!(outcome.metrics.lexical_candidates > 0);
    assert!(outcome.metrics.vector_candidates > 0);

    // --- Single methods agree on an exact-term query ---
    let keyword = engine
        .search_keyword_only("experience replay atari pixels", 1)
        .unwrap();
    assert_eq!(keyword[0].chunk.chunk_id, ChunkId(8));
    let vector = engine
        .search_vector_only("experience replay atari pixels", 1)
        .unwrap();
    assert_eq!(vector[0].chunk.chunk_id, ChunkId(8));
}

#[test]
fn e2e_reranking_reorders_pool() {
    let (_tmp, snapshot) = indexed();
    let engine = engine(&snapshot).with_scorer(Arc::new(OverlapScorer));

    let outcome = engine
        .search(
            &SearchQuery::new("masked language modeling bidirectional encoder")
                .with_limit(2)
                .with_reranking(true),
        )
        .unwrap();
    assert_eq!(outcome.method, SearchMethod::HybridReranked);
    assert_eq!(outcome.hits.len(), 2);
    assert_eq!(outcome.hits[0].chunk.chunk_id, ChunkId(10));
    assert!((outcome.hits[0].score - 1.0).abs() < 1e-6);
    assert!(outcome.hits[0].score >= outcome.hits[1].score);
    assert!(outcome.metrics.reranked);
}

#[test]
fn e2e_compare_and_evaluate() {
    let (_tmp, snapshot) = indexed();
    let engine = engine(&snapshot);

    let cmp = engine.compare("residual shortcut connections", 3).unwrap();
    assert_eq!(cmp.keyword_only[0].chunk.chunk_id, ChunkId(4));
    assert!(cmp.hybrid.len() <= 3);

    let cases = vec![
        EvalCase {
            query: "LSTM gating units".into(),
            relevant: vec![ChunkId(6)],
        },
        EvalCase {
            query: "experience replay atari".into(),
            relevant: vec![ChunkId(8)],
        },
        EvalCase {
            query: "masked language modeling".into(),
            relevant: vec![ChunkId(10)],
        },
        EvalCase {
            query: "no judgements for this one".into(),
            relevant: vec![],
        },
    ];
    let report = evaluate(&engine, &cases, 3).unwrap();
    assert_eq!(report.cases.len(), 3);
    assert_eq!(report.k, 3);
    assert_eq!(report.keyword_only.hit_rate, 1.0);
    assert_eq!(report.hybrid.hit_rate, 1.0);
    assert!(report.hybrid.recall <= 1.0);
}
