use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use libmqtt::mqtt::packet::{decode_publish, encode_publish};
use libmqtt::mqtt::{Message, QoS, topic};
use std::hint::black_box;

const PAYLOAD: &[u8] = b"{\"temp\":23.5,\"humidity\":65}";
const TOPIC: &str = "devices/sensor01/data";

fn bench_encode_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_publish");
    group.throughput(Throughput::Bytes(PAYLOAD.len() as u64));
    group.bench_function("qos1", |b| {
        let mut buf = [0u8; 256];
        let mut message = Message::new(PAYLOAD, QoS::AtLeastOnce);
        message.id = 2;
        b.iter(|| encode_publish(black_box(&mut buf), black_box(TOPIC), &message).unwrap());
    });
    group.finish();
}

fn bench_decode_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_publish");
    group.throughput(Throughput::Bytes(PAYLOAD.len() as u64));
    group.bench_function("qos1", |b| {
        let mut buf = [0u8; 256];
        let mut message = Message::new(PAYLOAD, QoS::AtLeastOnce);
        message.id = 2;
        let len = encode_publish(&mut buf, TOPIC, &message).unwrap();
        b.iter(|| decode_publish(black_box(&buf[..len])).unwrap());
    });
    group.finish();
}

fn bench_topic_match(c: &mut Criterion) {
    c.bench_function("topic_match", |b| {
        b.iter(|| {
            topic::matches(
                black_box("devices/+/data/#"),
                black_box("devices/sensor01/data/batch/7"),
            )
        })
    });
}

criterion_group!(
    benches,
    bench_encode_publish,
    bench_decode_publish,
    bench_topic_match
);
criterion_main!(benches);
