//! Commit cost benchmarks
//!
//! Measures a single membership change plus its commit on warm groups of
//! increasing size, under the path and full regions.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use treekem_cgka::{CgkaConfig, MemberId, RegionKind, TreeKem};
use treekem_crypto::CountingCrypto;

const SIZES: [u64; 3] = [64, 256, 1024];

fn warm_group(size: u64, region: RegionKind) -> TreeKem<CountingCrypto> {
    let members: Vec<_> = (0..size).map(MemberId).collect();
    let config = CgkaConfig::default().with_region(region);
    let mut group =
        TreeKem::init(config, CountingCrypto::new(size), &members).expect("valid roster");
    group.fill().expect("counting port never fails");
    group
}

fn regions() -> [(&'static str, RegionKind); 2] {
    [("path", RegionKind::Path), ("full", RegionKind::Full)]
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_commit");
    for (name, region) in regions() {
        for size in SIZES {
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, &size| {
                b.iter_batched(
                    || warm_group(size, region),
                    |mut tree| black_box(tree.add(MemberId(0), MemberId(size))),
                    BatchSize::LargeInput,
                );
            });
        }
    }
    group.finish();
}

fn bench_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_commit");
    for (name, region) in regions() {
        for size in SIZES {
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, &size| {
                b.iter_batched(
                    || warm_group(size, region),
                    |mut tree| black_box(tree.remove(MemberId(0), MemberId(size / 2))),
                    BatchSize::LargeInput,
                );
            });
        }
    }
    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_commit");
    for (name, region) in regions() {
        for size in SIZES {
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, &size| {
                b.iter_batched(
                    || warm_group(size, region),
                    |mut tree| black_box(tree.update(MemberId(size - 1), MemberId(0))),
                    BatchSize::LargeInput,
                );
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_add, bench_remove, bench_update);
criterion_main!(benches);
