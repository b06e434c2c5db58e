//! Search and insertion throughput for `HnswIndex` at a few corpus sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashMap;
use tokio::runtime::Runtime;
use vectordb_core::id::VectorId;
use vectordb_core::traits::index::AnnIndex;
use vectordb_core::types::record::{DistanceMetric, VectorRecord};
use vectordb_index::HnswIndex;

const DIMENSIONS: usize = 128;

fn seeded_vector(seed: usize) -> Vec<f32> {
    (0..DIMENSIONS)
        .map(|i| (((seed * 31 + i) % 997) as f32 / 997.0) - 0.5)
        .collect()
}

fn generate_records(count: usize) -> Vec<VectorRecord> {
    (0..count)
        .map(|i| {
            VectorRecord::new(
                VectorId::from_raw(format!("v{i:07}")),
                seeded_vector(i),
                HashMap::new(),
            )
        })
        .collect()
}

fn bench_search(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("hnsw_search");

    for size in [1_000usize, 10_000] {
        let index = HnswIndex::new(DIMENSIONS, DistanceMetric::Cosine);
        rt.block_on(index.build(generate_records(size))).unwrap();
        let query = seeded_vector(size / 2);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(&rt)
                .iter(|| async { black_box(index.search(&query, 10, None).await.unwrap()) });
        });
    }
    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("hnsw_insert");

    group.bench_function("add_one_thousand_incremental", |b| {
        b.to_async(&rt).iter_batched(
            || HnswIndex::new(DIMENSIONS, DistanceMetric::Cosine),
            |index| async move {
                for record in generate_records(1_000) {
                    index.add(record).await.unwrap();
                }
                black_box(index);
            },
            criterion::BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_search, bench_insert);
criterion_main!(benches);
