//! Benchmarks for duplicate checks.
//!
//! Covers the three costs that dominate a check:
//! - Shingling (cold and cached)
//! - Lexical filter scoring
//! - A full orchestrated check against an in-memory store

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

use echoless::embedding::HashedEmbedder;
use echoless::models::{ContentId, OwnerId};
use echoless::services::deduplication::{
    DeduplicationConfig, DeduplicationService, MembershipFilter, ShingleEngine, shingle_set,
};
use echoless::storage::InMemoryEmbeddingStore;

const SHORT_TEXT: &str = "Breathe.";
const MEDIUM_TEXT: &str = "Small steps every day add up to big change.";
const LONG_TEXT: &str = "You do not have to see the whole staircase to take the \
    first step. Progress is rarely a straight line, and the days that feel \
    slow are often the ones that build the foundation for everything after.";

fn bench_shingles(c: &mut Criterion) {
    let mut group = c.benchmark_group("shingles");
    for (name, text) in [("short", SHORT_TEXT), ("medium", MEDIUM_TEXT), ("long", LONG_TEXT)] {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("cold", name), &text, |b, text| {
            b.iter(|| shingle_set(black_box(text)));
        });

        let engine = ShingleEngine::new(128);
        engine.shingles(text);
        group.bench_with_input(BenchmarkId::new("cached", name), &text, |b, text| {
            b.iter(|| engine.shingles(black_box(text)));
        });
    }
    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let mut filter = MembershipFilter::new(10_000, 0.01).unwrap();
    for i in 0..5_000 {
        filter.add(&format!("token-{i}"));
    }

    c.bench_function("filter_contains", |b| {
        b.iter(|| filter.contains(black_box("token-4242")));
    });
}

fn bench_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("check");
    for history in [10usize, 100, 1_000] {
        let store = Arc::new(InMemoryEmbeddingStore::new(HashedEmbedder::DEFAULT_DIMENSIONS));
        let service = DeduplicationService::new(
            Arc::new(HashedEmbedder::new()),
            store,
            DeduplicationConfig::default(),
        )
        .unwrap();
        let owner = OwnerId::new("bench");
        for i in 0..history {
            service
                .add_content(
                    &ContentId::new(format!("m{i}")),
                    &owner,
                    &format!("message {i}: keep going, one day at a time"),
                    None,
                    None,
                )
                .unwrap();
        }

        group.bench_with_input(BenchmarkId::new("unique", history), &history, |b, _| {
            b.iter(|| {
                service
                    .check_for_duplicates(&owner, black_box(LONG_TEXT), None, None)
                    .unwrap()
            });
        });
        group.bench_with_input(BenchmarkId::new("lexical_hit", history), &history, |b, _| {
            b.iter(|| {
                service
                    .check_for_duplicates(
                        &owner,
                        black_box("message 0: keep going, one day at a time"),
                        None,
                        None,
                    )
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_shingles, bench_filter, bench_check);
criterion_main!(benches);
