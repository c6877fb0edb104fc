use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{GrayImage, Luma};
use planar_tracker::config::FeatureConfig;
use planar_tracker::features::{FeatureExtractor, GradientHistogramExtractor};
use planar_tracker::matching::{BruteForceMatcher, KdForestMatcher, Matcher, ratio_test};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn textured(width: u32, height: u32) -> GrayImage {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let bw = width.div_ceil(8);
    let blocks: Vec<u8> = (0..bw * height.div_ceil(8))
        .map(|_| rng.random_range(0..=255u8))
        .collect();
    GrayImage::from_fn(width, height, |x, y| {
        Luma([blocks[((y / 8) * bw + x / 8) as usize]])
    })
}

fn bench_extraction(c: &mut Criterion) {
    let img = textured(640, 480);
    let extractor = GradientHistogramExtractor::new(FeatureConfig::default());
    c.bench_function("detect_and_compute_640x480", |b| {
        b.iter(|| extractor.detect_and_compute(black_box(&img)))
    });
}

fn bench_matching(c: &mut Criterion) {
    let extractor = GradientHistogramExtractor::new(FeatureConfig::default());
    let template = extractor.detect_and_compute(&textured(320, 240));
    let frame = extractor.detect_and_compute(&textured(640, 480));

    let kd = KdForestMatcher::default();
    c.bench_function("kd_forest_knn", |b| {
        b.iter(|| {
            let knn = kd.knn_match(
                black_box(&template.descriptors),
                black_box(&frame.descriptors),
                2,
            );
            ratio_test(&knn, 0.7)
        })
    });
    c.bench_function("brute_force_knn", |b| {
        b.iter(|| {
            BruteForceMatcher.knn_match(
                black_box(&template.descriptors),
                black_box(&frame.descriptors),
                2,
            )
        })
    });
}

criterion_group!(benches, bench_extraction, bench_matching);
criterion_main!(benches);
