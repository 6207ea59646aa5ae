//! Benchmarks for plan token encoding and decoding.
//!
//! Run with: cargo bench -p wrt-codec --bench plan_codec_bench

use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::hint::black_box;
use wrt_codec::PlanCodec;

fn plan(blocks: usize) -> Value {
    let items: Vec<Value> = (0..blocks)
        .map(|i| {
            json!({
                "type": "event-card",
                "slug": format!("event-{i}"),
                "title": format!("Community Event {i}"),
                "tags": ["music", "outdoor", "family"],
            })
        })
        .collect();
    json!({ "version": 2, "blocks": items })
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_codec/encode");
    for (name, codec) in [
        ("high_ratio", PlanCodec::default()),
        ("fallback", PlanCodec::fallback_only()),
    ] {
        for blocks in [4usize, 64] {
            let doc = plan(blocks);
            group.bench_function(format!("{name}/{blocks}_blocks"), |b| {
                b.iter(|| codec.encode(black_box(&doc)))
            });
        }
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_codec/decode");
    for (name, codec) in [
        ("high_ratio", PlanCodec::default()),
        ("fallback", PlanCodec::fallback_only()),
    ] {
        let Ok(token) = codec.encode(&plan(64)) else {
            continue;
        };
        group.bench_function(format!("{name}/64_blocks"), |b| {
            b.iter(|| codec.decode(black_box(token.as_str())))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
