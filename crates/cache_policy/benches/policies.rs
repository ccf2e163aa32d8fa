// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Benchmarks for the eviction policies.

#![allow(missing_docs, reason = "Benchmark code")]

use std::hint::black_box;
use std::num::NonZeroUsize;

use cache_policy::{ArcCache, LruCache};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

criterion_group!(benches, bench_lru, bench_arc);
criterion_main!(benches);

const CAPACITIES: [usize; 3] = [64, 1024, 16_384];

fn bench_lru(c: &mut Criterion) {
    let mut group = c.benchmark_group("LruCache");
    group.throughput(Throughput::Elements(1));

    for capacity in CAPACITIES {
        group.bench_with_input(BenchmarkId::new("add_evicting", capacity), &capacity, |b, &capacity| {
            let mut cache = LruCache::new(capacity);
            let mut key = 0usize;
            b.iter(|| {
                black_box(cache.add(key, key));
                key = key.wrapping_add(1);
            });
        });

        group.bench_with_input(BenchmarkId::new("get_hit", capacity), &capacity, |b, &capacity| {
            let mut cache = LruCache::new(capacity);
            for key in 0..capacity {
                cache.add(key, key);
            }
            let mut key = 0usize;
            b.iter(|| {
                black_box(cache.get(&key));
                key = (key + 1) % capacity;
            });
        });
    }

    group.finish();
}

fn bench_arc(c: &mut Criterion) {
    let mut group = c.benchmark_group("ArcCache");
    group.throughput(Throughput::Elements(1));

    for capacity in CAPACITIES {
        let size = NonZeroUsize::new(capacity).expect("capacity is non-zero");

        group.bench_with_input(BenchmarkId::new("add_evicting", capacity), &size, |b, &size| {
            let cache = ArcCache::new(size);
            let mut key = 0usize;
            b.iter(|| {
                black_box(cache.add(key, key));
                key = key.wrapping_add(1);
            });
        });

        // Working set twice the capacity keeps the ghost lists busy.
        group.bench_with_input(BenchmarkId::new("mixed", capacity), &size, |b, &size| {
            let cache = ArcCache::new(size);
            let mut key = 0usize;
            b.iter(|| {
                if black_box(cache.get(&key)).is_none() {
                    cache.add(key, key);
                }
                key = (key + 7) % (capacity * 2);
            });
        });
    }

    group.finish();
}
