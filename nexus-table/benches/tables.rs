//! Benchmarks for the hash maps.
//!
//! Compares SwissMap and DeterministicMap against std's HashMap with the same
//! hasher.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nexus_table::{DeterministicMap, SwissMap};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxBuildHasher;
use std::collections::HashMap;

const SIZES: [usize; 3] = [1_000, 10_000, 100_000];

fn random_keys(n: usize) -> Vec<u64> {
    let mut rng = SmallRng::seed_from_u64(0x7ab1e);
    (0..n).map(|_| rng.random()).collect()
}

// ============================================================================
// Lookup hits
// ============================================================================

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_hit");
    let keys = random_keys(*SIZES.last().unwrap());

    for n in SIZES {
        let keys = &keys[..n];

        group.bench_with_input(BenchmarkId::new("swiss", n), &n, |b, &n| {
            let map: SwissMap<u64, u64> = keys.iter().map(|&k| (k, k)).collect();
            let mut i = 0;
            b.iter(|| {
                black_box(map.get(&keys[i % n]));
                i += 1;
            });
        });

        group.bench_with_input(BenchmarkId::new("deterministic", n), &n, |b, &n| {
            let map: DeterministicMap<u64, u64> = keys.iter().map(|&k| (k, k)).collect();
            let mut i = 0;
            b.iter(|| {
                black_box(map.get(&keys[i % n]));
                i += 1;
            });
        });

        group.bench_with_input(BenchmarkId::new("std", n), &n, |b, &n| {
            let map: HashMap<u64, u64, FxBuildHasher> = keys.iter().map(|&k| (k, k)).collect();
            let mut i = 0;
            b.iter(|| {
                black_box(map.get(&keys[i % n]));
                i += 1;
            });
        });
    }
    group.finish();
}

// ============================================================================
// Steady-state erase + insert (map stays at size n)
// ============================================================================

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn");
    let keys = random_keys(*SIZES.last().unwrap() * 2);

    for n in SIZES {
        group.bench_with_input(BenchmarkId::new("swiss", n), &n, |b, &n| {
            let mut map: SwissMap<u64, u64> = keys[..n].iter().map(|&k| (k, k)).collect();
            let mut i = 0;
            b.iter(|| {
                let old = keys[i % (2 * n)];
                let new = keys[(i + n) % (2 * n)];
                map.erase(&old);
                black_box(map.insert(new, new));
                i += 1;
            });
        });

        group.bench_with_input(BenchmarkId::new("deterministic", n), &n, |b, &n| {
            let mut map: DeterministicMap<u64, u64> =
                keys[..n].iter().map(|&k| (k, k)).collect();
            let mut i = 0;
            b.iter(|| {
                let old = keys[i % (2 * n)];
                let new = keys[(i + n) % (2 * n)];
                map.erase(&old);
                black_box(map.insert(new, new));
                i += 1;
            });
        });

        group.bench_with_input(BenchmarkId::new("std", n), &n, |b, &n| {
            let mut map: HashMap<u64, u64, FxBuildHasher> =
                keys[..n].iter().map(|&k| (k, k)).collect();
            let mut i = 0;
            b.iter(|| {
                let old = keys[i % (2 * n)];
                let new = keys[(i + n) % (2 * n)];
                map.remove(&old);
                black_box(map.insert(new, new));
                i += 1;
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_find, bench_churn);
criterion_main!(benches);
