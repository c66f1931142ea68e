//! 엔벨로프 벤치마크
//!
//! 엔벨로프 파싱, 직렬화, 복제 성능을 측정합니다.
//! 큐를 흐르는 모든 메시지가 이 경로를 지나므로 hot path에 해당합니다.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use relaypost_core::envelope::EventEnvelope;

fn minimal_json() -> String {
    r#"{"hostname":"web-01","timestamp":"2025-03-14T09:26:53Z","message":"ERROR disk full on /dev/sda1"}"#
        .to_owned()
}

fn enriched_json() -> String {
    let mut envelope = EventEnvelope::new(
        "web-01",
        "2025-03-14T09:26:53Z",
        "ERROR disk full on /dev/sda1",
    );
    envelope.severity = Some("error".to_owned());
    envelope.correlation_id = Some("550e8400-e29b-41d4-a716-446655440000".to_owned());
    envelope.rule_id = Some("disk-full".to_owned());
    envelope.team = Some("infra".to_owned());
    envelope.handling = Some("page_and_ticket".to_owned());
    for i in 0..10 {
        envelope
            .extra
            .insert(format!("field_{i}"), serde_json::json!(format!("value_{i}")));
    }
    envelope.to_json().unwrap()
}

fn bench_envelope_parse(c: &mut Criterion) {
    let minimal = minimal_json();
    let enriched = enriched_json();

    let mut group = c.benchmark_group("envelope_parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("parse_minimal", |b| {
        b.iter(|| EventEnvelope::from_json(black_box(&minimal)).unwrap())
    });

    group.bench_function("parse_enriched_10_extra_fields", |b| {
        b.iter(|| EventEnvelope::from_json(black_box(&enriched)).unwrap())
    });

    group.finish();
}

fn bench_envelope_serialize(c: &mut Criterion) {
    let minimal = EventEnvelope::from_json(&minimal_json()).unwrap();
    let enriched = EventEnvelope::from_json(&enriched_json()).unwrap();

    let mut group = c.benchmark_group("envelope_serialize");
    group.throughput(Throughput::Elements(1));

    group.bench_function("serialize_minimal", |b| {
        b.iter(|| black_box(&minimal).to_json().unwrap())
    });

    group.bench_function("serialize_enriched_10_extra_fields", |b| {
        b.iter(|| black_box(&enriched).to_json().unwrap())
    });

    group.finish();
}

fn bench_envelope_mutation(c: &mut Criterion) {
    let envelope = EventEnvelope::from_json(&minimal_json()).unwrap();

    let mut group = c.benchmark_group("envelope_mutation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("clone", |b| {
        b.iter(|| {
            let _ = black_box(&envelope).clone();
        })
    });

    group.bench_function("ensure_correlation_id", |b| {
        b.iter(|| {
            let mut e = envelope.clone();
            let _ = e.ensure_correlation_id();
        })
    });

    group.bench_function("increment_retry_and_serialize", |b| {
        // 재큐잉 경로: retry 증가 후 재직렬화
        b.iter(|| {
            let mut e = envelope.clone();
            e.increment_retry();
            e.to_json().unwrap()
        })
    });

    group.finish();
}

fn bench_envelope_display(c: &mut Criterion) {
    let mut envelope = EventEnvelope::from_json(&minimal_json()).unwrap();
    envelope.correlation_id = Some("550e8400-e29b-41d4-a716-446655440000".to_owned());

    let mut group = c.benchmark_group("envelope_display");
    group.throughput(Throughput::Elements(1));

    group.bench_function("display", |b| {
        b.iter(|| {
            let _s = format!("{}", black_box(&envelope));
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_envelope_parse,
    bench_envelope_serialize,
    bench_envelope_mutation,
    bench_envelope_display
);
criterion_main!(benches);
