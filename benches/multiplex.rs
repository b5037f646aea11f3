//! Request multiplexing benchmark suite.
//!
//! Measures round-trips over one connection at different concurrency
//! levels, against an in-memory peer that answers every request at once.
//!
//! Run with: cargo bench --bench multiplex
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use futures_util::future::join_all;
use kurento_rpc::transport::{MemoryPeer, memory_transport};
use kurento_rpc::{Connection, ConnectionOptions, Request};
use serde_json::{Value, json};
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const CONCURRENCY: &[usize] = &[1, 16, 256];

// ============================================================================
// Setup
// ============================================================================

/// Answers every request; emits one event per request when `events` is set.
async fn echo_peer(mut peer: MemoryPeer, events: bool) {
    while let Some(request) = peer.next_request().await {
        if events {
            peer.emit("Tick", "obj-1", json!({ "id": request["id"] }));
        }
        peer.respond(&request, json!({ "value": request["id"] }));
    }
}

fn setup(rt: &Runtime, events: bool) -> Connection {
    let _guard = rt.enter();
    let (sink, source, peer) = memory_transport();
    let connection = Connection::spawn("mem://bench", sink, source, &ConnectionOptions::default());
    rt.spawn(echo_peer(peer, events));
    connection
}

fn invoke() -> Request {
    Request::new("invoke", json!({ "object": "obj-1", "operation": "getName" }))
}

// ============================================================================
// Benchmark: Concurrent Round-Trips
// ============================================================================

fn bench_round_trips(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let connection = setup(&rt, false);

    let mut group = c.benchmark_group("round_trips");

    for &concurrency in CONCURRENCY {
        group.bench_with_input(
            BenchmarkId::new("requests", concurrency),
            &concurrency,
            |b, &n| {
                b.to_async(&rt).iter(|| async {
                    let responses = join_all((0..n).map(|_| connection.request(invoke()))).await;
                    black_box(responses);
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Benchmark: Round-Trips With Event Dispatch
// ============================================================================

fn bench_with_events(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let connection = setup(&rt, true);

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    connection.subscribe("Tick", "obj-1", "bench", move |data: &Value| {
        black_box(data);
        counter.fetch_add(1, Ordering::Relaxed);
    });

    let mut group = c.benchmark_group("with_events");

    for &concurrency in CONCURRENCY {
        group.bench_with_input(
            BenchmarkId::new("requests", concurrency),
            &concurrency,
            |b, &n| {
                b.to_async(&rt).iter(|| async {
                    let responses = join_all((0..n).map(|_| connection.request(invoke()))).await;
                    black_box(responses);
                });
            },
        );
    }

    group.finish();
    black_box(received.load(Ordering::Relaxed));
}

criterion_group!(benches, bench_round_trips, bench_with_events);
criterion_main!(benches);
