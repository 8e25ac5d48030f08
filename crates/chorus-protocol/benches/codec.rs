//! Codec benchmarks for chorus-protocol.

use chorus_protocol::{codec, WsMessage};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::json;

fn sample() -> WsMessage {
    WsMessage::new("x".repeat(64)).with_headers(json!({
        "HX-Request": "true",
        "HX-Trigger": "chat-form",
        "HX-Current-URL": "http://localhost:8080/",
    }))
}

fn bench_decode_text(c: &mut Criterion) {
    let text = codec::encode_text(&sample()).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("json_64B", |b| b.iter(|| codec::decode_text(black_box(&text))));
    group.finish();
}

fn bench_decode_binary(c: &mut Criterion) {
    let encoded = codec::encode_binary(&sample()).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("msgpack_64B", |b| {
        b.iter(|| codec::decode_binary(black_box(&encoded)))
    });
    group.finish();
}

criterion_group!(benches, bench_decode_text, bench_decode_binary);
criterion_main!(benches);
