//! Benchmarks for list parsing and block set construction.

use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::BTreeSet;
use std::hint::black_box;

use pidns::parser::{parse_list, serialize_domains};
use pidns::reconciler::CombinedBlockSet;

/// A hosts file in the shape of the big public lists: a comment header,
/// mostly sinkhole lines, some AdBlock rules and bare domains.
fn generate_list(count: usize) -> String {
    let mut out = String::from("# Title: benchmark list\n# Entries: many\n\n");
    for i in 0..count {
        let line = match i % 10 {
            0 => format!("||tracker{}.example.net^\n", i),
            1 => format!("cdn{}.example.org\n", i),
            2 => "! AdBlock comment\n".to_string(),
            _ => format!("0.0.0.0 ads{}.example.com\n", i),
        };
        out.push_str(&line);
    }
    out
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_list");

    for size in [1_000, 10_000, 100_000] {
        let content = generate_list(size);
        group.throughput(Throughput::Bytes(content.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &content, |b, content| {
            b.iter(|| black_box(parse_list(content)));
        });
    }

    group.finish();
}

fn bench_cache_roundtrip(c: &mut Criterion) {
    let domains = parse_list(&generate_list(50_000));
    let serialized = serialize_domains(&domains);

    c.bench_function("serialize_domains_50k", |b| {
        b.iter(|| black_box(serialize_domains(&domains)))
    });
    c.bench_function("reparse_cache_50k", |b| {
        b.iter(|| black_box(parse_list(&serialized)))
    });
}

fn bench_combine(c: &mut Criterion) {
    let mut group = c.benchmark_group("combined_block_set");

    for sources in [2usize, 5, 10] {
        // Overlapping sets, as real lists share most of their domains
        let sets: Vec<(u64, BTreeSet<String>)> = (0..sources)
            .map(|s| {
                let domains = (0..20_000)
                    .map(|i| format!("host{}.example.com", i + s * 5_000))
                    .collect();
                (s as u64 + 1, domains)
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("from_sets", sources), &sets, |b, sets| {
            b.iter(|| black_box(CombinedBlockSet::from_sets(sets.clone(), Utc::now())));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_cache_roundtrip, bench_combine);
criterion_main!(benches);
