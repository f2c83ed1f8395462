use criterion::{criterion_group, criterion_main, Criterion};
use pl_bench::fixture::random_vectors;
use pl_core::ChunkId;
use pl_storage::VectorStore;

/// Benchmark: usearch k-NN (target <10ms for 50K vectors, k=10)
fn bench_vector_knn(c: &mut Criterion) {
    let dimension = 384;
    let num_vectors = 50_000;

    let mut store = VectorStore::new(dimension).unwrap();
    let vectors = random_vectors(num_vectors, dimension, 7);
    let ids: Vec<ChunkId> = (1..=num_vectors as u64).map(ChunkId).collect();
    store.add(&ids, &vectors).unwrap();

    let query = random_vectors(1, dimension, 42).remove(0);

    let mut group = c.benchmark_group("vector_knn");

    group.bench_function("knn_k10_50k_384d", |b| {
        b.iter(|| {
            let _ = store.search_knn(&query, 10);
        });
    });

    group.bench_function("knn_k50_50k_384d", |b| {
        b.iter(|| {
            let _ = store.search_knn(&query, 50);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_vector_knn);
criterion_main!(benches);
