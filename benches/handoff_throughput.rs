//! Benchmarks for callback handoff overhead

use courier::channel::HandoffChannel;
use courier::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::executor::LocalPool;
use std::sync::Arc;
use std::thread;

fn bench_channel_single_thread(c: &mut Criterion) {
    let channel = HandoffChannel::new();

    c.bench_function("channel_put_try_get", |b| {
        b.iter(|| {
            channel.put(black_box(42u64)).unwrap();
            black_box(channel.try_get())
        });
    });
}

fn bench_channel_cross_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_cross_thread");

    for producers in [1usize, 4, 8] {
        let per_producer = 10_000;
        group.throughput(Throughput::Elements((producers * per_producer) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(producers),
            &producers,
            |b, &producers| {
                b.iter(|| {
                    let channel = Arc::new(HandoffChannel::new());
                    let handles: Vec<_> = (0..producers)
                        .map(|_| {
                            let channel = channel.clone();
                            thread::spawn(move || {
                                for i in 0..per_producer {
                                    channel.put(i).unwrap();
                                }
                            })
                        })
                        .collect();

                    for _ in 0..producers * per_producer {
                        black_box(channel.get());
                    }
                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_serializing_execute(c: &mut Criterion) {
    let executor = SerializingExecutor::new();

    c.bench_function("serializing_execute", |b| {
        b.iter(|| {
            executor.execute_fn("bench", || {
                black_box(1 + 1);
            })
        });
    });
}

fn bench_cooperative_deliver(c: &mut Criterion) {
    let mut pool = LocalPool::new();
    let executor = CooperativeExecutor::new(&pool.spawner(), &Config::default()).unwrap();
    let batch = 1_000;

    let mut group = c.benchmark_group("cooperative");
    group.throughput(Throughput::Elements(batch));
    group.bench_function("execute_and_drain", |b| {
        b.iter(|| {
            for _ in 0..batch {
                executor
                    .execute_fn("bench", || {
                        black_box(1 + 1);
                    })
                    .unwrap();
            }
            pool.run_until_stalled();
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_channel_single_thread,
    bench_channel_cross_thread,
    bench_serializing_execute,
    bench_cooperative_deliver
);
criterion_main!(benches);
