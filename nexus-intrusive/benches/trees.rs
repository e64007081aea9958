//! Benchmarks for intrusive tree and heap operations.
//!
//! Compares the three trees against each other and against std's BTreeSet,
//! and the intrusive heap against BinaryHeap.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nexus_intrusive::{
    AvlTree, BoxedAvlStorage, BoxedHeapStorage, BoxedRbStorage, BoxedWbStorage, MinHeap, RbTree,
    WbTree,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

const SIZES: [usize; 3] = [1_000, 10_000, 100_000];

fn random_keys(n: usize) -> Vec<u64> {
    let mut rng = SmallRng::seed_from_u64(0xbe4c);
    (0..n).map(|_| rng.random()).collect()
}

// ============================================================================
// Steady-state insert + erase (tree stays at size n)
// ============================================================================

macro_rules! bench_tree_churn {
    ($group:expr, $name:literal, $n:expr, $keys:expr, $tree:ident, $storage:ident) => {
        $group.bench_with_input(BenchmarkId::new($name, $n), &$n, |b, &n| {
            let mut storage: $storage<u64> = $storage::with_capacity(n + 1);
            let mut tree: $tree<u64, $storage<u64>> = $tree::new();
            for &k in &$keys[..n] {
                tree.try_insert(&mut storage, k).unwrap();
            }
            let mut i = 0;
            b.iter(|| {
                let old = $keys[i % n];
                let node = tree.find(&storage, &old).unwrap();
                tree.erase(&mut storage, node);
                black_box(tree.insert(&mut storage, node));
                i += 1;
            });
        });
    };
}

fn bench_tree_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_churn");
    let keys = random_keys(*SIZES.last().unwrap());

    for n in SIZES {
        bench_tree_churn!(group, "avl", n, keys, AvlTree, BoxedAvlStorage);
        bench_tree_churn!(group, "rb", n, keys, RbTree, BoxedRbStorage);
        bench_tree_churn!(group, "wb", n, keys, WbTree, BoxedWbStorage);

        group.bench_with_input(BenchmarkId::new("btreeset", n), &n, |b, &n| {
            let mut set: BTreeSet<u64> = keys[..n].iter().copied().collect();
            let mut i = 0;
            b.iter(|| {
                let old = keys[i % n];
                set.remove(&old);
                black_box(set.insert(old));
                i += 1;
            });
        });
    }

    group.finish();
}

// ============================================================================
// Lookup
// ============================================================================

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_find");
    let keys = random_keys(*SIZES.last().unwrap());

    for n in SIZES {
        group.bench_with_input(BenchmarkId::new("avl", n), &n, |b, &n| {
            let mut storage: BoxedAvlStorage<u64> = BoxedAvlStorage::with_capacity(n);
            let mut tree: AvlTree<u64, BoxedAvlStorage<u64>> = AvlTree::new();
            for &k in &keys[..n] {
                tree.try_insert(&mut storage, k).unwrap();
            }
            let mut i = 0;
            b.iter(|| {
                i += 1;
                black_box(tree.find(&storage, &keys[i % n]))
            });
        });

        group.bench_with_input(BenchmarkId::new("wb_select", n), &n, |b, &n| {
            let mut storage: BoxedWbStorage<u64> = BoxedWbStorage::with_capacity(n);
            let mut tree: WbTree<u64, BoxedWbStorage<u64>> = WbTree::new();
            for &k in &keys[..n] {
                tree.try_insert(&mut storage, k).unwrap();
            }
            let mut i = 0;
            b.iter(|| {
                i += 1;
                black_box(tree.select(&storage, i % tree.len()))
            });
        });

        group.bench_with_input(BenchmarkId::new("btreeset", n), &n, |b, &n| {
            let set: BTreeSet<u64> = keys[..n].iter().copied().collect();
            let mut i = 0;
            b.iter(|| {
                i += 1;
                black_box(set.contains(&keys[i % n]))
            });
        });
    }

    group.finish();
}

// ============================================================================
// Heap
// ============================================================================

fn bench_heap(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap_push_pop");
    let keys = random_keys(*SIZES.last().unwrap());

    for n in SIZES {
        group.bench_with_input(BenchmarkId::new("intrusive", n), &n, |b, &n| {
            let mut storage: BoxedHeapStorage<u64> = BoxedHeapStorage::with_capacity(n + 1);
            let mut heap: MinHeap<u64, BoxedHeapStorage<u64>> = MinHeap::new();
            for &k in &keys[..n] {
                heap.try_push_value(&mut storage, k).unwrap();
            }
            let mut i = 0;
            b.iter(|| {
                let top = heap.pop(&mut storage).unwrap();
                heap.push(&mut storage, top);
                i += 1;
                black_box(i)
            });
        });

        group.bench_with_input(BenchmarkId::new("binary_heap", n), &n, |b, &n| {
            let mut heap: BinaryHeap<Reverse<u64>> = keys[..n].iter().map(|&k| Reverse(k)).collect();
            b.iter(|| {
                let top = heap.pop().unwrap();
                heap.push(black_box(top));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tree_churn, bench_find, bench_heap);
criterion_main!(benches);
