//! Benchmarks for build and query throughput on synthetic corpora.
//!
//! Simulates realistic document sizes:
//! - small:  ~10 KB of prose (a long article)
//! - medium: ~100 KB (a short book chapter collection)
//! - large:  ~1 MB (a full book)
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use treex::{BuildOptions, HeapArena, LayoutKind, SuffixTree, Text, TreeBuilder};

// ============================================================================
// CORPUS SIMULATION
// ============================================================================

const WORDS: &[&str] = &[
    "suffix", "tree", "arena", "storage", "pattern", "search", "index", "branch", "offset",
    "layout", "hybrid", "promotion", "navigator", "builder", "terminator", "occurrence",
    "substring", "repeated", "anchor", "traversal",
];

/// Deterministic pseudo-prose: word choice driven by a tiny LCG so every
/// run benchmarks the same text.
fn synthetic_text(target_units: usize) -> String {
    let mut state: u64 = 0x2545_F491_4F6C_DD1D;
    let mut out = String::with_capacity(target_units + 16);
    while out.len() < target_units {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let word = WORDS[(state >> 33) as usize % WORDS.len()];
        out.push_str(word);
        out.push(' ');
    }
    out
}

const SIZES: &[(&str, usize)] = &[("small", 10_000), ("medium", 100_000), ("large", 1_000_000)];

// ============================================================================
// BENCHMARKS
// ============================================================================

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(10);
    for &(name, units) in SIZES {
        let text = synthetic_text(units);
        group.throughput(Throughput::Elements(units as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &text, |b, text| {
            b.iter(|| SuffixTree::build_in_memory(black_box(text)).unwrap());
        });
    }
    group.finish();
}

fn bench_build_hybrid(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_hybrid");
    group.sample_size(10);
    let text = synthetic_text(100_000);
    let options = BuildOptions {
        layout: LayoutKind::Compact,
        compact_limit: 64 * 1024,
    };
    group.bench_function("promoted_100k", |b| {
        b.iter(|| {
            TreeBuilder::with_options(HeapArena::new(), options)
                .build(&Text::from(black_box(text.as_str())))
                .unwrap()
        });
    });
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let text = synthetic_text(100_000);
    let tree = SuffixTree::build_in_memory(&text).unwrap();

    let mut group = c.benchmark_group("query");
    group.bench_function("contains_hit", |b| {
        b.iter(|| tree.contains(black_box("hybrid promotion")).unwrap());
    });
    group.bench_function("contains_miss", |b| {
        b.iter(|| tree.contains(black_box("zzzzzzzz")).unwrap());
    });
    group.bench_function("count_occurrences", |b| {
        b.iter(|| tree.count_occurrences(black_box("suffix")).unwrap());
    });
    group.bench_function("find_all_occurrences", |b| {
        b.iter(|| tree.find_all_occurrences(black_box("anchor")).unwrap());
    });
    group.bench_function("longest_common_substring", |b| {
        b.iter(|| {
            tree.longest_common_substring(black_box("navigator promotion terminator nonsense"))
                .unwrap()
        });
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_build_hybrid, bench_queries);
criterion_main!(benches);
