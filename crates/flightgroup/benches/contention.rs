// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Benchmarks for call deduplication.

#![allow(missing_docs, reason = "Benchmark code")]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{Criterion, criterion_group, criterion_main};
use flightgroup::FlightGroup;

criterion_group!(benches, bench_single_call, bench_contention);
criterion_main!(benches);

static KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_key() -> String {
    format!("key_{}", KEY_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Fixed overhead of one call without contention.
fn bench_single_call(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let group = Arc::new(FlightGroup::<String, String>::new());

    c.bench_function("single_call", |b| {
        b.to_async(&rt).iter(|| {
            let group = Arc::clone(&group);
            async move { group.work(unique_key(), || async { "value".to_string() }).await }
        });
    });
}

/// 64 tasks racing on one key.
fn bench_contention(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let group = Arc::new(FlightGroup::<String, String>::new());

    c.bench_function("contention_64", |b| {
        b.to_async(&rt).iter(|| {
            let group = Arc::clone(&group);
            async move {
                let key = unique_key();
                let tasks: Vec<_> = (0..64)
                    .map(|_| {
                        let group = Arc::clone(&group);
                        let key = key.clone();
                        tokio::spawn(async move { group.work(key, || async { "value".to_string() }).await })
                    })
                    .collect();

                for task in tasks {
                    task.await.expect("Task panicked");
                }
            }
        });
    });
}
