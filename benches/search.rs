//! Benchmarks for knowledge base search.
//!
//! Search is a linear scan, so the interesting axis is map size and how
//! early the result list fills up.

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use kbgate::knowledge::{KnowledgeMap, document};
use kbgate::services::search;
use std::hint::black_box;

fn knowledge_map(size: usize) -> KnowledgeMap {
    (0..size)
        .map(|i| (format!("keyword{i:05}"), format!("Description number {i}.")))
        .collect()
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");

    for size in [100, 1_000, 10_000] {
        let map = knowledge_map(size);

        group.bench_with_input(BenchmarkId::new("capped_early", size), &map, |b, map| {
            b.iter(|| search(black_box(map), black_box("keyword")));
        });
        group.bench_with_input(BenchmarkId::new("single_match", size), &map, |b, map| {
            b.iter(|| search(black_box(map), black_box("keyword00042")));
        });
        group.bench_with_input(BenchmarkId::new("no_match", size), &map, |b, map| {
            b.iter(|| search(black_box(map), black_box("zzz")));
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in [100, 1_000, 10_000] {
        let text = document::encode(&knowledge_map(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| document::decode(black_box(text)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_search, bench_decode);
criterion_main!(benches);
