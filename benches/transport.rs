//! Transport Benchmarks
//!
//! - Argument encode/decode cost for a typical command
//! - Batch handoff through a swap channel
//! - Full owner -> worker -> owner round trip against the memory backend

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use store_connector::core::codec::{decode_command, encode_command};
use store_connector::transport::{Channel, ItemList, ItemPool};
use store_connector::{AsyncConnector, ArgReader, ArgWriter, ConnectorConfig, MemoryServer, StoreConfig};

fn bench_codec(c: &mut Criterion) {
    let params = ["player:42:inventory", "slot", "7", "item", "ember-staff"];

    c.bench_function("encode_command", |b| {
        let mut buf = Vec::with_capacity(128);
        b.iter(|| {
            let mut w = ArgWriter::reuse(std::mem::take(&mut buf));
            encode_command(&mut w, black_box("HSET"), black_box(&params));
            buf = w.into_bytes();
        })
    });

    let mut w = ArgWriter::new();
    encode_command(&mut w, "HSET", &params);
    let payload = w.into_bytes();
    c.bench_function("decode_command", |b| {
        b.iter(|| {
            let mut r = ArgReader::new(black_box(&payload));
            black_box(decode_command(&mut r).map(|(name, p)| (name.len(), p.len())))
        })
    });
}

fn bench_channel_handoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_handoff");
    for batch in [1usize, 64, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            let channel = Channel::new();
            let mut pool = ItemPool::new(0, batch);
            let mut local = ItemList::new();
            let mut drained = ItemList::new();
            b.iter(|| {
                for _ in 0..batch {
                    if let Ok(item) = pool.acquire() {
                        local.push_back(item);
                    }
                }
                channel.publish(&mut local);
                channel.collect(&mut drained);
                for item in drained.drain(..) {
                    pool.release(item);
                }
            })
        });
    }
    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let server = MemoryServer::new();
    let config = ConnectorConfig {
        idle_sleep: Duration::from_micros(50),
        ..Default::default()
    };
    let mut conn = AsyncConnector::start(server.client(), config).expect("start connector");
    conn.connect(&StoreConfig::default(), |_| {}).expect("queue connect");
    while conn.pending_requests() > 0 {
        conn.update();
    }

    c.bench_function("connector_round_trip_64", |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;
            for _ in 0..iters {
                let done = Rc::new(Cell::new(0u32));
                let start = Instant::now();
                for _ in 0..64 {
                    let done = done.clone();
                    conn.command("INCR", &["bench"], move |_| done.set(done.get() + 1))
                        .expect("queue command");
                }
                while done.get() < 64 {
                    conn.update();
                }
                total += start.elapsed();
            }
            total
        })
    });

    conn.stop();
}

criterion_group!(benches, bench_codec, bench_channel_handoff, bench_round_trip);
criterion_main!(benches);
