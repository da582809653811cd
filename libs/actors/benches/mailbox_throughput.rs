//! Benchmark for message delivery throughput
//!
//! Measures tell-to-delivery cost for one actor and for many actors sharing
//! the dispatcher, and the round trip of a query.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stage_actors::{Actor, ActorRef, Context, Definition, Stage, StageConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Sink {
    delivered: Arc<AtomicU64>,
}

impl Actor for Sink {}

fn bench_stage() -> Stage {
    let mut config = StageConfig::default();
    config.stage.name = "bench".to_string();
    config.eviction.enabled = false;
    Stage::new(config).expect("stage starts")
}

fn sink(stage: &Stage, delivered: &Arc<AtomicU64>) -> ActorRef<Sink> {
    let delivered = Arc::clone(delivered);
    stage
        .actor_for(Definition::new(move |_| Sink { delivered }))
        .expect("sink starts")
}

fn wait_for(delivered: &AtomicU64, expected: u64) {
    while delivered.load(Ordering::Relaxed) < expected {
        std::hint::spin_loop();
    }
}

fn bench_single_actor(c: &mut Criterion) {
    let stage = bench_stage();
    let delivered = Arc::new(AtomicU64::new(0));
    let actor = sink(&stage, &delivered);

    let mut group = c.benchmark_group("single_actor");
    for batch in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(batch));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                let target = delivered.load(Ordering::Relaxed) + batch;
                for _ in 0..batch {
                    actor.tell("deliver()", |sink: &mut Sink, _ctx: &Context<Sink>| {
                        sink.delivered.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    });
                }
                wait_for(&delivered, target);
            })
        });
    }
    group.finish();
    stage.terminate();
}

fn bench_fan_out(c: &mut Criterion) {
    let stage = bench_stage();
    let delivered = Arc::new(AtomicU64::new(0));
    let actors: Vec<_> = (0..64).map(|_| sink(&stage, &delivered)).collect();

    c.bench_function("fan_out_64_actors_x_100", |b| {
        b.iter(|| {
            let target = delivered.load(Ordering::Relaxed) + 64 * 100;
            for _ in 0..100 {
                for actor in &actors {
                    actor.tell("deliver()", |sink: &mut Sink, _ctx: &Context<Sink>| {
                        sink.delivered.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    });
                }
            }
            wait_for(&delivered, target);
        })
    });
    stage.terminate();
}

fn bench_query_round_trip(c: &mut Criterion) {
    let stage = bench_stage();
    let delivered = Arc::new(AtomicU64::new(0));
    let actor = sink(&stage, &delivered);

    c.bench_function("query_round_trip", |b| {
        b.iter(|| {
            let value = actor
                .query("delivered()", |sink: &mut Sink, _ctx: &Context<Sink>| {
                    Ok(sink.delivered.load(Ordering::Relaxed))
                })
                .await_timeout(Duration::from_secs(1))
                .expect("query answered");
            criterion::black_box(value);
        })
    });
    stage.terminate();
}

criterion_group!(benches, bench_single_actor, bench_fan_out, bench_query_round_trip);
criterion_main!(benches);
