use std::fs;
use std::path::Path;
use std::sync::Arc;

use pl_core::{Embedder, ModelError, RelevanceScorer, SearchMethod};
use pl_indexer::IngestConfig;
use pl_service::{RerankRequest, SearchRequest, SearchService, ServiceConfig, ServiceError};
use tempfile::TempDir;

const TOPICS: [&str; 4] = ["attention", "convolution", "reinforcement", "speech"];

struct TopicEmbedder;

impl Embedder for TopicEmbedder {
    fn dimension(&self) -> usize {
        TOPICS.len()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let lower = text.to_lowercase();
        Ok(TOPICS
            .iter()
            .map(|t| lower.matches(t).count() as f32)
            .collect())
    }
}

/// Scores by how many query words the candidate contains.
struct OverlapScorer;

impl RelevanceScorer for OverlapScorer {
    fn score(&self, query: &str, candidate: &str) -> Result<f32, ModelError> {
        let candidate = candidate.to_lowercase();
        Ok(query
            .to_lowercase()
            .split_whitespace()
            .filter(|w| candidate.contains(w))
            .count() as f32)
    }
}

fn write_corpus(dir: &Path) {
    fs::write(
        dir.join("papers.jsonl"),
        r#"{"chunk_id": 1, "text": "Self-attention relates every position of a sequence.", "paper_title": "Attention Is All You Need", "authors": "Vaswani et al.", "year": 2017, "arxiv_id": "1706.03762", "source_pdf": "1706.03762.pdf"}
{"chunk_id": 2, "text": "Deep convolution stacks learn image hierarchies.", "paper_title": "ImageNet Classification", "authors": "Krizhevsky et al.", "year": 2012}
{"chunk_id": 3, "text": "Agents trained with reinforcement learning play Atari games.", "paper_title": "Playing Atari", "authors": "Mnih et al.", "year": 2013, "arxiv_id": "1312.5602"}
{"chunk_id": 4, "text": "Attention-based models transcribe speech end to end.", "paper_title": "Listen, Attend and Spell", "authors": "Chan et al.", "year": 2015, "arxiv_id": "1508.01211"}
"#,
    )
    .unwrap();
}

struct Fixture {
    _store: TempDir,
    corpus: TempDir,
    service: SearchService,
}

fn fixture(with_scorer: bool) -> Fixture {
    let store = TempDir::new().unwrap();
    let corpus = TempDir::new().unwrap();
    write_corpus(corpus.path());

    let config = ServiceConfig {
        storage_root: store.path().join("index"),
        embedding_dim: TOPICS.len(),
        ..ServiceConfig::default()
    };
    let scorer: Option<Arc<dyn RelevanceScorer>> = if with_scorer {
        Some(Arc::new(OverlapScorer))
    } else {
        None
    };
    let service = SearchService::new(config, Arc::new(TopicEmbedder), scorer);
    Fixture {
        _store: store,
        corpus,
        service,
    }
}

fn started(with_scorer: bool) -> Fixture {
    let f = fixture(with_scorer);
    f.service.start().unwrap();
    f.service
        .ingest_and_reload(f.corpus.path(), &IngestConfig::default())
        .unwrap();
    f
}

// --- Lifecycle ---

#[test]
fn requests_before_start_are_not_ready() {
    let f = fixture(false);
    assert!(!f.service.is_ready());
    let err = f.service.search(&SearchRequest::new("attention")).unwrap_err();
    assert!(matches!(err, ServiceError::NotReady { .. }));
    assert!(err.is_retryable());
}

#[test]
fn fresh_root_starts_empty() {
    let f = fixture(false);
    f.service.start().unwrap();
    assert!(f.service.is_ready());

    let resp = f.service.search(&SearchRequest::new("attention")).unwrap();
    assert_eq!(resp.total_results, 0);
    assert_eq!(f.service.health().unwrap().document_count, 0);
}

#[test]
fn ingest_and_reload_makes_chunks_searchable() {
    let f = fixture(false);
    f.service.start().unwrap();
    let report = f
        .service
        .ingest_and_reload(f.corpus.path(), &IngestConfig::default())
        .unwrap();
    assert_eq!(report.chunks_indexed, 4);

    let health = f.service.health().unwrap();
    assert!(health.ready);
    assert_eq!(health.document_count, 4);
    assert_eq!(health.vector_count, 4);
    assert!(!health.reranker_enabled);

    let resp = f
        .service
        .search(&SearchRequest::new("attention").with_k(2))
        .unwrap();
    assert_eq!(resp.method, SearchMethod::HybridRrf);
    assert_eq!(resp.total_results, 2);
    let ids: Vec<u64> = resp.results.iter().map(|r| r.chunk_id).collect();
    assert!(ids.contains(&1) && ids.contains(&4), "{ids:?}");
    assert!(resp.metrics.is_some());
    assert_eq!(resp.results[0].method, SearchMethod::HybridRrf);
}

#[test]
fn shutdown_then_reload() {
    let f = started(false);
    f.service.shutdown().unwrap();
    assert!(matches!(
        f.service.keyword_search("atari", None),
        Err(ServiceError::NotReady { .. })
    ));

    f.service.reload().unwrap();
    let resp = f.service.keyword_search("atari", None).unwrap();
    assert_eq!(resp.results[0].chunk_id, 3);
}

#[test]
fn embedder_dimension_must_match_config() {
    let store = TempDir::new().unwrap();
    let config = ServiceConfig {
        storage_root: store.path().to_path_buf(),
        embedding_dim: 16,
        ..ServiceConfig::default()
    };
    let service = SearchService::new(config, Arc::new(TopicEmbedder), None);
    assert!(matches!(service.start(), Err(ServiceError::Config { .. })));
}

// --- Validation ---

#[test]
fn k_outside_bounds_is_rejected() {
    let f = started(false);
    for k in [0, 21] {
        let err = f
            .service
            .search(&SearchRequest::new("attention").with_k(k))
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument { .. }));
    }
    assert!(f.service.search(&SearchRequest::new("attention").with_k(20)).is_ok());
    assert!(matches!(
        f.service.compare("attention", Some(11)),
        Err(ServiceError::InvalidArgument { .. })
    ));
}

#[test]
fn blank_query_is_rejected() {
    let f = started(false);
    assert!(matches!(
        f.service.search(&SearchRequest::new("   ")),
        Err(ServiceError::InvalidArgument { .. })
    ));
}

// --- Single-method and comparison ---

#[test]
fn single_method_endpoints_report_their_method() {
    let f = started(false);

    let vector = f.service.vector_search("reinforcement", Some(1)).unwrap();
    assert_eq!(vector.method, SearchMethod::VectorOnly);
    assert_eq!(vector.results[0].chunk_id, 3);
    assert_eq!(vector.results[0].method, SearchMethod::VectorOnly);

    let keyword = f.service.keyword_search("convolution", Some(5)).unwrap();
    assert_eq!(keyword.method, SearchMethod::KeywordOnly);
    assert_eq!(keyword.total_results, 1);
    assert_eq!(keyword.results[0].paper_title, "ImageNet Classification");
}

#[test]
fn compare_returns_previews() {
    let f = started(false);
    let cmp = f.service.compare("speech", Some(2)).unwrap();
    assert_eq!(cmp.query, "speech");
    assert!(cmp.keyword_only[0].starts_with("Attention-based models"));
    assert!(cmp.hybrid.iter().all(|p| p.ends_with("...")));
    assert!(cmp.vector_only.len() <= 2);
}

// --- Reranking ---

#[test]
fn search_with_reranking() {
    let f = started(true);
    let resp = f
        .service
        .search(
            &SearchRequest::new("attention speech")
                .with_k(1)
                .with_reranking(true),
        )
        .unwrap();
    assert_eq!(resp.method, SearchMethod::HybridReranked);
    assert_eq!(resp.results[0].chunk_id, 4);
    assert_eq!(resp.results[0].score, 2.0);
}

#[test]
fn standalone_rerank_ranks_from_one() {
    let f = fixture(true);
    let resp = f
        .service
        .rerank(&RerankRequest {
            query: "graph neural networks".into(),
            candidates: vec![
                "convolution on images".into(),
                "graph neural networks generalize convolution".into(),
                "neural networks".into(),
            ],
            top_k: Some(2),
        })
        .unwrap();
    let ranks: Vec<usize> = resp.reranked_results.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2]);
    assert_eq!(
        resp.reranked_results[0].text,
        "graph neural networks generalize convolution"
    );
    assert_eq!(resp.reranked_results[1].text, "neural networks");
}

#[test]
fn rerank_edge_cases() {
    let f = fixture(true);
    let empty = f
        .service
        .rerank(&RerankRequest {
            query: "q".into(),
            candidates: vec![],
            top_k: None,
        })
        .unwrap();
    assert!(empty.reranked_results.is_empty());

    let without_model = fixture(false);
    let err = without_model
        .service
        .rerank(&RerankRequest {
            query: "q".into(),
            candidates: vec!["a".into()],
            top_k: None,
        })
        .unwrap_err();
    assert!(matches!(err, ServiceError::RerankUnavailable { .. }));
}
