//! Benchmarks for version parsing, allocation and query matching.

use cardex::version::{allocate, SemVer, VersionIncrement, VersionQuery, VersionRequest};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// `size` minor releases, most recent first.
fn history(size: u64) -> Vec<SemVer> {
    (0..size).rev().map(|minor| SemVer::new(1, minor, 0)).collect()
}

fn bench_semver_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("semver_parse");

    for input in ["1", "1.2.3", "2.0.0-rc.12", "1.4.0-rc.2+build.7"] {
        group.bench_with_input(BenchmarkId::from_parameter(input), input, |b, s| {
            b.iter(|| SemVer::parse(black_box(s)))
        });
    }

    group.finish();
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate");
    let minor = VersionRequest::new(VersionIncrement::Minor);
    let pre = VersionRequest::new(VersionIncrement::Pre("rc".to_string()));
    let explicit = SemVer::new(9, 0, 0);

    for size in [1u64, 16, 256, 4096] {
        let existing = history(size);

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("minor", size), &existing, |b, existing| {
            b.iter(|| allocate("fraud", "risk", &minor, None, black_box(existing)))
        });
        group.bench_with_input(BenchmarkId::new("pre", size), &existing, |b, existing| {
            b.iter(|| allocate("fraud", "risk", &pre, Some(&explicit), black_box(existing)))
        });
    }

    group.finish();
}

fn bench_query_matches(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_matches");
    let existing = history(1024);

    for query in ["1.512.0", "1.*", "^1.2", "~1.2.0"] {
        let parsed = VersionQuery::parse(query).unwrap();
        group.throughput(Throughput::Elements(existing.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(query), &existing, |b, existing| {
            b.iter(|| existing.iter().filter(|v| parsed.matches(black_box(v))).count())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_semver_parse, bench_allocate, bench_query_matches);
criterion_main!(benches);
