// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use logpipe::fanout::FanoutBuffer;
use logpipe::record::{Level, Record};
use logpipe::retry_queue::{RetryEntry, RetryQueue};
use std::sync::Arc;

fn bench_fanout_two_sinks(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("failed to build runtime");
    let mut group = c.benchmark_group("fanout");

    for batch in [16u64, 256, 1024] {
        group.bench_with_input(BenchmarkId::new("submit_recv", batch), &batch, |b, &batch| {
            b.to_async(&runtime).iter(|| async move {
                let buffer = FanoutBuffer::new(batch as usize, batch as usize);
                let mut file = buffer.subscribe();
                let mut remote = buffer.subscribe();
                for id in 0..batch {
                    let _ = buffer.submit(Record::new(id, Level::Info, "Something happened"));
                }
                buffer.close();
                while let Some(record) = file.recv().await {
                    black_box(record);
                }
                while let Some(record) = remote.recv().await {
                    black_box(record);
                }
            });
        });
    }
    group.finish();
}

fn bench_retry_queue_overflow(c: &mut Criterion) {
    let record = Arc::new(Record::new(0, Level::Warn, "retry"));
    let mut group = c.benchmark_group("retry_queue");

    for capacity in [100usize, 1000] {
        group.bench_with_input(
            BenchmarkId::new("push_at_capacity", capacity),
            &capacity,
            |b, &capacity| {
                let mut queue = RetryQueue::new(capacity);
                for _ in 0..capacity {
                    queue.push(RetryEntry::new(Arc::clone(&record)));
                }
                b.iter(|| black_box(queue.push(RetryEntry::new(Arc::clone(&record)))));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_fanout_two_sinks, bench_retry_queue_overflow);
criterion_main!(benches);
