//! Performance benchmarks for a3s-eventstream
//!
//! Run with: cargo bench

use a3s_eventstream::{
    construct_event, decode_event, encode_event, ClientConfig, EventStreamClient, MemoryBroker,
    PublishRequest,
};
use criterion::{criterion_group, criterion_main, Criterion};

fn request() -> PublishRequest {
    PublishRequest::new("rateChanged")
        .with_topic("market")
        .with_namespace("forex")
        .with_client_ids(vec!["c1".into(), "c2".into()])
        .with_payload(serde_json::json!({"rate": 7.35, "currency": "USD/CNY"}))
}

fn bench_event_construction(c: &mut Criterion) {
    let request = request();
    c.bench_function("construct_event", |b| {
        b.iter(|| construct_event(&request).unwrap());
    });
}

fn bench_event_codec(c: &mut Criterion) {
    let (_, event) = construct_event(&request()).unwrap();

    c.bench_function("encode_event", |b| {
        b.iter(|| encode_event(&event).unwrap());
    });

    let bytes = encode_event(&event).unwrap();
    c.bench_function("decode_event", |b| {
        b.iter(|| decode_event(&bytes).unwrap());
    });
}

fn bench_memory_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let client = EventStreamClient::new("bench", MemoryBroker::default(), ClientConfig::default());

    c.bench_function("publish_sync (memory)", |b| {
        b.to_async(&rt)
            .iter(|| async { client.publish_sync(request()).await.unwrap() });
    });
}

fn bench_memory_fan_out(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let client = EventStreamClient::new("bench", MemoryBroker::default(), ClientConfig::default());

    let mut group = c.benchmark_group("publish_fan_out");
    for count in [1, 4, 16] {
        let topics: Vec<String> = (0..count).map(|i| format!("topic{}", i)).collect();
        group.bench_function(format!("{} topics", count), |b| {
            b.to_async(&rt).iter(|| async {
                client
                    .publish_sync(request().with_topics(topics.clone()))
                    .await
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_event_construction,
    bench_event_codec,
    bench_memory_publish,
    bench_memory_fan_out,
);
criterion_main!(benches);
