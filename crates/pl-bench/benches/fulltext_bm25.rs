use criterion::{criterion_group, criterion_main, Criterion};
use pl_bench::fixture::synthetic_corpus;
use pl_storage::FullTextStore;
use tempfile::TempDir;

/// Benchmark: Tantivy BM25 search (target <50ms for 50K chunks)
fn bench_fulltext_bm25(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let mut store = FullTextStore::open(&tmp.path().join("tantivy")).unwrap();

    for chunk in synthetic_corpus(50_000, 11) {
        store.add_chunk(&chunk).unwrap();
    }
    store.commit().unwrap();

    let mut group = c.benchmark_group("fulltext_bm25");

    group.bench_function("bm25_50k_chunks_single_term", |b| {
        b.iter(|| {
            let _ = store.search_bm25("quantization", 10);
        });
    });

    group.bench_function("bm25_50k_chunks_multi_term", |b| {
        b.iter(|| {
            let _ = store.search_bm25("contrastive retrieval with sparse attention", 10);
        });
    });

    group.bench_function("bm25_50k_chunks_title_term", |b| {
        b.iter(|| {
            let _ = store.search_bm25("synthetic paper", 20);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_fulltext_bm25);
criterion_main!(benches);
