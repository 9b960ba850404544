//! Benchmarks for event encoding and decoding.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use parley_protocol::{codec, ClientEvent, MessagePayload, MessageType, ServerEvent};

fn new_message(size: usize) -> ServerEvent {
    ServerEvent::NewMessage {
        message: MessagePayload {
            id: "5f0c6a2e-8f7b-4d3a-9a55-0b3f1f1e9c21".to_string(),
            room_id: "general".to_string(),
            sender_id: "user-1".to_string(),
            sender_username: "alice".to_string(),
            content: "x".repeat(size),
            message_type: MessageType::Text,
            attachment_url: None,
            created_at: Utc::now(),
        },
        warnings: None,
    }
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_new_message");

    for size in [64, 1024, 16 * 1024] {
        let event = new_message(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("msgpack_{}B", size), |b| {
            b.iter(|| codec::encode(black_box(&event)).unwrap());
        });
        group.bench_function(format!("json_{}B", size), |b| {
            b.iter(|| codec::encode_json(black_box(&event)).unwrap());
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_send_message");

    let event = ClientEvent::send_text("general", "x".repeat(256));
    let binary = codec::encode(&event).unwrap();
    let text = codec::encode_json(&event).unwrap();

    group.bench_function("msgpack_256B", |b| {
        b.iter(|| codec::decode::<ClientEvent>(black_box(&binary)).unwrap());
    });
    group.bench_function("json_256B", |b| {
        b.iter(|| codec::decode_json::<ClientEvent>(black_box(&text)).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
