//! Benchmarks for the density clustering core.

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use topicgraph::config::MinClusterSize;
use topicgraph::{ClusteringParams, DensityClusterer};

/// Deterministic synthetic embeddings: `groups` well-separated directions
/// with small per-unit jitter, plus a sprinkle of isolated noise points.
fn synthetic_embeddings(n: usize, dims: usize, groups: usize) -> Vec<Vec<f32>> {
    let mut embeddings = Vec::with_capacity(n);
    for i in 0..n {
        let group = i % groups;
        let mut v = vec![0.0f32; dims];
        #[allow(clippy::cast_precision_loss)]
        let jitter = 0.001 * (i / groups) as f32;
        v[group % dims] = 1.0;
        v[(group + 1) % dims] = 0.05 + jitter;
        embeddings.push(v);
    }
    embeddings
}

fn params() -> ClusteringParams {
    ClusteringParams {
        min_cluster_size: MinClusterSize::Fixed(5),
        min_samples: 2,
        epsilon: 0.3,
        ..Default::default()
    }
}

fn bench_cluster_scaling(c: &mut Criterion) {
    let clusterer = DensityClusterer::new(params());
    let mut group = c.benchmark_group("cluster_scaling");
    for n in [100, 500, 1_000] {
        let embeddings = synthetic_embeddings(n, 64, 8);
        group.bench_with_input(BenchmarkId::from_parameter(n), &embeddings, |b, data| {
            b.iter(|| clusterer.cluster(black_box(data)).unwrap());
        });
    }
    group.finish();
}

fn bench_cluster_dimensionality(c: &mut Criterion) {
    let clusterer = DensityClusterer::new(params());
    let mut group = c.benchmark_group("cluster_dimensionality");
    for dims in [32, 128, 384] {
        let embeddings = synthetic_embeddings(500, dims, 8);
        group.bench_with_input(
            BenchmarkId::from_parameter(dims),
            &embeddings,
            |b, data| {
                b.iter(|| clusterer.cluster(black_box(data)).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_cluster_scaling, bench_cluster_dimensionality);
criterion_main!(benches);
