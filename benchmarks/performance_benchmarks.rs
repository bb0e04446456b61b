//! Criterion-based performance benchmarks
//!
//! Covers the hot paths of a benchmark run: slice layout, merging slice
//! detections and computing average precision.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use wentral::benchmark::average_precision;
use wentral::slicing::{combine_sequence, slice_boxes};
use wentral::{BBox, Detection};

/// A grid of detections inside each slice, shifted so neighbours overlap
fn slice_detections(slices: &[BBox], per_slice: usize) -> Vec<Vec<Detection>> {
    slices
        .iter()
        .enumerate()
        .map(|(i, slice)| {
            let side = slice.width();
            (0..per_slice)
                .map(|j| {
                    let x = (j % 8) as f32 * side / 8.0;
                    let y = (j / 8) as f32 * side / 8.0 + (i % 3) as f32;
                    let confidence = 0.3 + (j % 7) as f32 * 0.1;
                    Detection::new(x, y, x + side / 10.0, y + side / 12.0, confidence)
                })
                .collect()
        })
        .collect()
}

fn bench_slice_boxes(c: &mut Criterion) {
    c.bench_function("slice_boxes_1280x7000", |b| {
        b.iter(|| slice_boxes(black_box((1280, 7000)), black_box(0.7), black_box(0.2)))
    });
}

fn bench_combine_sequence(c: &mut Criterion) {
    let mut group = c.benchmark_group("combine_sequence");
    let slices = slice_boxes((1280, 7000), 0.7, 0.2);

    for per_slice in [8, 32, 64] {
        let detections = slice_detections(&slices, per_slice);
        group.throughput(Throughput::Elements((per_slice * slices.len()) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(per_slice),
            &detections,
            |b, detections| b.iter(|| combine_sequence(black_box(&slices), detections, 0.4)),
        );
    }

    group.finish();
}

fn bench_average_precision(c: &mut Criterion) {
    let mut group = c.benchmark_group("average_precision");

    for count in [100usize, 1_000, 10_000] {
        let pairs: Vec<(f32, bool)> = (0..count)
            .map(|i| ((i % 97) as f32 / 97.0, i % 3 != 0))
            .collect();
        let ground_truth = count * 3 / 4;

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &pairs, |b, pairs| {
            b.iter(|| average_precision(black_box(pairs), ground_truth))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_slice_boxes,
    bench_combine_sequence,
    bench_average_precision
);
criterion_main!(benches);
