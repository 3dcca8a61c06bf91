//! Coverage Operations Benchmarks
//!
//! Benchmarks for bit scanning, counter encoding and per-test union queries.
//!
//! Run with: `cargo bench --bench coverage_ops`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use slotcov::codec::{read_counters, write_rle};
use slotcov::coverage::{InMemoryCoverage, PerTestCoverage, SlotRange, TestCaseInfo, TestId};
use slotcov::{BitVector, PerTestRecording};
use std::collections::HashSet;

/// Counters with long zero runs and a few hot regions, like a real test run
fn sparse_counters(len: usize, seed: usize) -> Vec<i32> {
    (0..len)
        .map(|i| {
            if (i + seed) % 97 < 6 {
                ((i * 31 + seed) % 5) as i32 + 1
            } else {
                0
            }
        })
        .collect()
}

fn bench_next_set_bit(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_set_bit");

    for density in [1usize, 16, 256] {
        let bits: BitVector = (0..1_000_000).step_by(density * 64).collect();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("every_{density}_words")),
            &bits,
            |bench, bits| {
                bench.iter(|| {
                    let mut count = 0usize;
                    let mut slot = bits.next_set_bit(0);
                    while let Some(s) = slot {
                        count += 1;
                        slot = bits.next_set_bit(s + 1);
                    }
                    black_box(count);
                });
            },
        );
    }

    group.finish();
}

fn bench_rle(c: &mut Criterion) {
    let mut group = c.benchmark_group("rle");

    for len in [10_000usize, 100_000, 1_000_000] {
        let counters = sparse_counters(len, 7);
        let mut encoded = Vec::new();
        write_rle(&mut encoded, &counters).unwrap_or_default();

        group.bench_with_input(BenchmarkId::new("encode", len), &counters, |bench, counters| {
            bench.iter(|| {
                let mut out = Vec::with_capacity(encoded.len());
                black_box(write_rle(&mut out, black_box(counters)).unwrap_or_default());
            });
        });
        group.bench_with_input(BenchmarkId::new("decode", len), &encoded, |bench, bytes| {
            bench.iter(|| {
                black_box(read_counters(black_box(bytes)).map(|d| d.sum).unwrap_or_default());
            });
        });
    }

    group.finish();
}

fn bench_union_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("union_queries");
    let size = 200_000;

    for tests in [10u32, 100, 500] {
        let mut coverage = InMemoryCoverage::new(size);
        for id in 0..tests {
            let recording =
                PerTestRecording::new("BenchTest", format!("t{id}"), sparse_counters(size, id as usize));
            let info = TestCaseInfo::from_recording(TestId::new(id), &recording);
            if coverage.add_coverage(&info, &recording).is_err() {
                return;
            }
        }
        let ids: HashSet<TestId> = (0..tests).map(TestId::new).collect();

        group.bench_with_input(BenchmarkId::new("full", tests), &ids, |bench, ids| {
            bench.iter(|| black_box(coverage.hits_for_tests(ids, None).count_ones()));
        });
        group.bench_with_input(BenchmarkId::new("clipped", tests), &ids, |bench, ids| {
            let range = SlotRange::new(size / 4, size / 8);
            bench.iter(|| black_box(coverage.hits_for_tests(ids, Some(range)).count_ones()));
        });
        group.bench_with_input(BenchmarkId::new("tests_covering", tests), &(), |bench, ()| {
            let range = SlotRange::new(size / 2, 64);
            bench.iter(|| black_box(coverage.tests_covering(range).len()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_next_set_bit, bench_rle, bench_union_queries);
criterion_main!(benches);
