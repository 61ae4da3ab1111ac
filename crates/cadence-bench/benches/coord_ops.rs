//! Criterion micro-benchmarks for the coordination primitives.

use std::hint::black_box;

use cadence_coord::{AdvisoryLock, BroadcastChannel, VersionedQueue};
use cadence_core::{encode_batch, Tick};
use criterion::{criterion_group, criterion_main, Criterion};

/// Benchmark: Push then drain 10K items at one version.
fn bench_queue_push_drain_10k(c: &mut Criterion) {
    let queue = VersionedQueue::<u64>::new("bench");
    let mut tick = Tick(0);

    c.bench_function("queue_push_drain_10k", |b| {
        b.iter(|| {
            tick = tick.next();
            queue.set_version(tick);
            queue.push(0..10_000u64);
            let drained = queue.drain(tick).count();
            black_box(drained);
        });
    });
}

/// Benchmark: Pop with a stale version (the late-worker fast path).
fn bench_queue_stale_pop(c: &mut Criterion) {
    let queue = VersionedQueue::<u64>::new("bench");
    queue.set_version(Tick(2));
    queue.push(0..16u64);

    c.bench_function("queue_stale_pop", |b| {
        b.iter(|| black_box(queue.pop(black_box(Tick(1)))));
    });
}

/// Benchmark: Publish to 8 subscribers and drain each inbox.
fn bench_channel_fanout_8(c: &mut Criterion) {
    let channel = BroadcastChannel::<u64>::new("bench");
    let subs: Vec<_> = (0..8).map(|_| channel.subscribe()).collect();

    c.bench_function("channel_fanout_8", |b| {
        b.iter(|| {
            channel.publish(black_box(7));
            for sub in &subs {
                black_box(sub.try_recv().ok().flatten());
            }
        });
    });
}

/// Benchmark: Uncontended lock scope.
fn bench_lock_scope(c: &mut Criterion) {
    let lock = AdvisoryLock::new("bench");

    c.bench_function("lock_scope_uncontended", |b| {
        b.iter(|| lock.scope(|| black_box(1)));
    });
}

/// Benchmark: Frame 64 effect payloads of 32 bytes.
fn bench_encode_batch_64(c: &mut Criterion) {
    let payloads: Vec<Vec<u8>> = (0..64u8).map(|i| vec![i; 32]).collect();

    c.bench_function("encode_batch_64x32", |b| {
        b.iter(|| black_box(encode_batch(black_box(&payloads))));
    });
}

criterion_group!(
    benches,
    bench_queue_push_drain_10k,
    bench_queue_stale_pop,
    bench_channel_fanout_8,
    bench_lock_scope,
    bench_encode_batch_64,
);
criterion_main!(benches);
