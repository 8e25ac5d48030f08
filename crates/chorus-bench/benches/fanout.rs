//! Hub fan-out benchmarks.
//!
//! Each iteration submits one message and waits until every session has it.

use chorus_core::{HistoryRetention, Hub, HubConfig, HubHandle, JsonFormatter, Message, Outbound};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn setup(sessions: usize, config: HubConfig) -> (HubHandle, Vec<Outbound>) {
    let (hub, _task) = Hub::spawn(config, JsonFormatter);
    let mut outbounds = Vec::with_capacity(sessions);
    for i in 0..sessions {
        let (session, outbound) = hub.open_session(format!("bench-{}", i));
        hub.register(session).await.unwrap();
        outbounds.push(outbound);
    }
    (hub, outbounds)
}

fn bench_fanout(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("fanout");

    for size in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let (hub, mut outbounds) = rt.block_on(setup(size, HubConfig::default()));

            b.iter_custom(|iters| {
                rt.block_on(async {
                    let start = Instant::now();
                    for i in 0..iters {
                        hub.submit(Message::new("bench", i.to_string())).await.unwrap();
                        for outbound in &mut outbounds {
                            black_box(outbound.recv().await);
                        }
                    }
                    start.elapsed()
                })
            });
        });
    }

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("replay");

    for history in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(history as u64));
        group.bench_with_input(BenchmarkId::from_parameter(history), &history, |b, &history| {
            let config = HubConfig {
                history: HistoryRetention::Bounded(history),
                ..Default::default()
            };
            let (hub, _) = rt.block_on(setup(0, config));
            rt.block_on(async {
                for i in 0..history {
                    hub.submit(Message::new("bench", i.to_string())).await.unwrap();
                }
            });

            b.iter_custom(|iters| {
                rt.block_on(async {
                    let mut total = Duration::ZERO;
                    for i in 0..iters {
                        let id = format!("late-{}", i);
                        let (session, mut outbound) = hub.open_session(id.as_str());
                        let start = Instant::now();
                        hub.register(session).await.unwrap();
                        for _ in 0..history {
                            black_box(outbound.recv().await);
                        }
                        total += start.elapsed();
                        hub.unregister(outbound.key()).await.unwrap();
                    }
                    total
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fanout, bench_replay);
criterion_main!(benches);
