//! Benchmarks for the outbound buffer and the offline send path.

use std::time::{Duration, Instant};

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use crossbeam_channel::unbounded;
use tyme_link::{
    ConnectionBuilder, Payload,
    connection::{
        ConnectionCore, FixedDelay, OutboundBuffer, TransportEvent,
        testing::{MockTransport, RecordingListener},
    },
};

const MESSAGES: usize = 1_000;

fn payloads() -> Vec<Payload> {
    (0..MESSAGES)
        .map(|i| Payload::from(format!("message {i}")))
        .collect()
}

fn bench_buffer(c: &mut Criterion) {
    c.bench_function("buffer_push_drain", |b| {
        b.iter_batched(
            payloads,
            |batch| {
                let mut buffer = OutboundBuffer::new();
                for payload in batch {
                    buffer.push(payload);
                }
                black_box(buffer.drain().count())
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_offline_flush(c: &mut Criterion) {
    let config = ConnectionBuilder::new("ws://bench.local/c/ws")
        .with_warn_interval_ms(60_000)
        .build_config()
        .expect("valid configuration");
    c.bench_function("queue_then_flush_on_open", |b| {
        b.iter_batched(
            || {
                let transport = MockTransport::new();
                let state = transport.state();
                let (events, rx) = unbounded();
                let core = ConnectionCore::new(
                    config.clone(),
                    transport,
                    RecordingListener::new(),
                    Box::new(FixedDelay::new(Duration::from_secs(1))),
                    events,
                );
                (core, state, rx, payloads())
            },
            |(mut core, state, _rx, batch)| {
                let now = Instant::now();
                core.connect(now);
                for payload in batch {
                    core.send(payload);
                }
                let generation = state.lock().open_count() as u64;
                core.handle_event(generation, TransportEvent::Opened, now);
                black_box(state.lock().sent.len())
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_buffer, bench_offline_flush);
criterion_main!(benches);
