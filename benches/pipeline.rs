//! Hot-path benchmarks for the routing and streaming pipeline
//!
//! Measures the non-I/O work done per query and per render tick.
//!
//! ## Expected Performance Characteristics
//!
//! - Routing decision: low microseconds (keyword scans over the query)
//! - Buffer write: tens of nanoseconds (one uncontended mutex + push)
//! - Viewport check: dominated by SHA-256 over the rendered content
//! - Cache lookup: linear in entries for semantic matching
//!
//! Run with: `cargo bench`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rigchat::cache::{CacheManager, QueryCache};
use rigchat::router::{RouterOptions, RoutingDecisionEngine};
use rigchat::security::{ClassificationLevel, PolicyEnforcer, TracingAuditSink};
use rigchat::stream::{StreamingBuffer, ViewportOptimizer};
use std::hint::black_box;
use std::sync::Arc;

fn bench_routing_decision(c: &mut Criterion) {
    let audit = Arc::new(TracingAuditSink);
    let engine = RoutingDecisionEngine::new(Arc::new(PolicyEnforcer::new(audit.clone())), audit);
    let options = RouterOptions::default().with_cloud_key(true);

    let cases = [
        ("trivial", "hi", ClassificationLevel::Unclassified),
        (
            "expert",
            "Design a distributed consensus protocol with Byzantine fault tolerance",
            ClassificationLevel::Unclassified,
        ),
        ("classified", "summarise the report", ClassificationLevel::Secret),
    ];

    let mut group = c.benchmark_group("routing_decision");
    for (name, query, level) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), &query, |b, q| {
            b.iter(|| engine.decide(black_box(q), level, "auto", Some(&options)));
        });
    }
    group.finish();
}

fn bench_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming_buffer");

    group.bench_function("write", |b| {
        let buffer = StreamingBuffer::with_config(1000, 1);
        b.iter(|| {
            buffer.write(black_box("token "));
            if buffer.pending() >= 1000 {
                buffer.reset();
            }
        });
    });

    group.bench_function("write_15_then_flush", |b| {
        let buffer = StreamingBuffer::new();
        b.iter(|| {
            for _ in 0..15 {
                buffer.write("tok ");
            }
            black_box(buffer.flush())
        });
    });

    group.finish();
}

fn bench_viewport(c: &mut Criterion) {
    let mut group = c.benchmark_group("viewport_should_update");

    for size in [256usize, 4096, 65536] {
        let content = "x".repeat(size);
        group.bench_with_input(BenchmarkId::new("unchanged", size), &content, |b, content| {
            let mut viewport = ViewportOptimizer::new();
            viewport.should_update(content);
            b.iter(|| viewport.should_update(black_box(content)));
        });
    }

    group.finish();
}

fn bench_cache_lookup(c: &mut Criterion) {
    let cache = QueryCache::default();
    for i in 0..500 {
        cache.store(
            &format!("how do I configure service number {} for production", i),
            "answer",
            "Local",
        );
    }

    let mut group = c.benchmark_group("cache_lookup");
    group.bench_function("exact", |b| {
        b.iter(|| cache.lookup(black_box("How do I configure service number 250 for production?")));
    });
    group.bench_function("miss", |b| {
        b.iter(|| cache.lookup(black_box("completely unrelated question about gardening")));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_routing_decision,
    bench_buffer,
    bench_viewport,
    bench_cache_lookup
);
criterion_main!(benches);
