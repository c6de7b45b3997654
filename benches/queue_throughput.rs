//! Throughput benchmarks for buffers crossing a queue.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use padflow::elements::AppSrc;
use padflow::prelude::*;
use std::hint::black_box;

const WAIT: ClockTime = ClockTime::from_secs(30);

fn run_to_eos(pipeline: &Pipeline) {
    pipeline.set_state(State::Playing).unwrap();
    let msg = pipeline
        .bus()
        .timed_pop_filtered(Some(WAIT), MessageType::EOS | MessageType::ERROR)
        .expect("pipeline stalled");
    assert_eq!(msg.type_(), MessageType::EOS, "{msg}");
    pipeline.set_state(State::Null).unwrap();
}

/// Source thread and queue thread, with the queue sized so it never blocks.
fn bench_source_queue_sink(c: &mut Criterion) {
    let mut group = c.benchmark_group("source_queue_sink");
    let count = 1_000u64;

    for size in [64usize, 4 * 1024, 64 * 1024] {
        group.throughput(Throughput::Bytes(count * size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let line = format!(
                "fakesrc num-buffers={count} sizemax={size} ! queue max-size-bytes=0 max-size-time=0 max-size-buffers=0 ! fakesink sync=false"
            );
            b.iter(|| {
                let pipeline = padflow::parse::launch(&line).unwrap();
                run_to_eos(black_box(&pipeline));
            });
        });
    }

    group.finish();
}

/// Small queues make the producer block on every other buffer.
fn bench_backpressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("backpressure");
    let count = 1_000u64;

    for capacity in [1u32, 4, 64] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                let line = format!(
                    "fakesrc num-buffers={count} sizemax=256 ! queue max-size-buffers={capacity} ! fakesink sync=false"
                );
                b.iter(|| {
                    let pipeline = padflow::parse::launch(&line).unwrap();
                    run_to_eos(black_box(&pipeline));
                });
            },
        );
    }

    group.finish();
}

fn bench_leaky(c: &mut Criterion) {
    let mut group = c.benchmark_group("leaky_queue");
    let count = 1_000u64;

    for leaky in ["upstream", "downstream"] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(leaky), leaky, |b, leaky| {
            let line = format!(
                "fakesrc num-buffers={count} sizemax=256 ! queue max-size-buffers=4 leaky={leaky} ! fakesink sync=false"
            );
            b.iter(|| {
                let pipeline = padflow::parse::launch(&line).unwrap();
                run_to_eos(black_box(&pipeline));
            });
        });
    }

    group.finish();
}

/// Application thread pushing through appsrc.
fn bench_appsrc_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("appsrc_push");
    let count = 1_000u64;
    let payload = vec![0u8; 1024];

    group.throughput(Throughput::Bytes(count * payload.len() as u64));
    group.bench_function("1024", |b| {
        b.iter(|| {
            let pipeline = Pipeline::new();
            let src = AppSrc::new("src");
            let queue = ElementFactory::make("queue").build().unwrap();
            let sink = ElementFactory::make("fakesink")
                .property("sync", false)
                .build()
                .unwrap();
            pipeline.add_many(&[src.element(), &queue, &sink]).unwrap();
            Element::link_many(&[src.element(), &queue, &sink]).unwrap();
            pipeline.set_state(State::Playing).unwrap();

            for _ in 0..count {
                src.push_buffer(Buffer::from_slice(&payload)).unwrap();
            }
            src.end_of_stream().unwrap();
            let msg = pipeline
                .bus()
                .timed_pop_filtered(Some(WAIT), MessageType::EOS | MessageType::ERROR)
                .expect("pipeline stalled");
            assert_eq!(msg.type_(), MessageType::EOS);
            pipeline.set_state(State::Null).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_source_queue_sink,
    bench_backpressure,
    bench_leaky,
    bench_appsrc_push,
);

criterion_main!(benches);
