//! R*-tree benchmarks

use arbor::dbid::DBID;
use arbor::distance::EuclideanDistance;
use arbor_spatial::rstar::BulkSplit;
use arbor_spatial::{MemoryPageFile, PersistentPageFile, RStarNode, RStarTree, RStarTreeConfig};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use tempfile::tempdir;

type MemTree = RStarTree<MemoryPageFile<RStarNode>>;

fn points(n: usize, seed: u64) -> Vec<(DBID, Vec<f64>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let p = vec![rng.gen_range(0.0..1000.0), rng.gen_range(0.0..1000.0)];
            (DBID::new(i as u32), p)
        })
        .collect()
}

fn loaded_tree(n: usize) -> MemTree {
    let mut tree = MemTree::new(MemoryPageFile::new(), RStarTreeConfig::new()).unwrap();
    tree.bulk_load(points(n, 1)).unwrap();
    tree
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("RStarTree Insert");

    for size in [100, 1000, 10000].iter() {
        let data = points(*size, 2);
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter_with_setup(
                || MemTree::new(MemoryPageFile::new(), RStarTreeConfig::new()).unwrap(),
                |mut tree| {
                    for (id, p) in data {
                        tree.insert(*id, p).unwrap();
                    }
                    black_box(tree.size())
                },
            );
        });
    }

    group.finish();
}

fn bench_persistent_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("RStarTree Persistent Insert");
    let data = points(1000, 3);

    group.bench_function("insert_1k", |b| {
        b.iter_with_setup(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.pages");
                let file = PersistentPageFile::<RStarNode>::create(&path, 4096, 256).unwrap();
                (RStarTree::new(file, RStarTreeConfig::new()).unwrap(), dir)
            },
            |(mut tree, _dir)| {
                for (id, p) in &data {
                    tree.insert(*id, p).unwrap();
                }
                black_box(tree.size())
            },
        );
    });

    group.finish();
}

fn bench_bulk_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("RStarTree Bulk Load");
    let data = points(10000, 4);

    for split in [BulkSplit::SortTileRecursive, BulkSplit::HilbertSort, BulkSplit::OneDimSort] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", split)), &split, |b, &split| {
            b.iter_with_setup(
                || {
                    let config = RStarTreeConfig::new().with_bulk_split(split);
                    (MemTree::new(MemoryPageFile::new(), config).unwrap(), data.clone())
                },
                |(mut tree, data)| {
                    tree.bulk_load(data).unwrap();
                    black_box(tree.height())
                },
            );
        });
    }

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("RStarTree Search");
    let tree = loaded_tree(10000);

    group.bench_function("knn_10_of_10k", |b| {
        b.iter(|| black_box(tree.knn(&EuclideanDistance, &[500.0, 500.0], 10).unwrap()));
    });

    group.bench_function("range_25_of_10k", |b| {
        b.iter(|| black_box(tree.range(&EuclideanDistance, &[500.0, 500.0], 25.0).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_persistent_insert, bench_bulk_load, bench_queries);
criterion_main!(benches);
