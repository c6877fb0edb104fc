//! Keypoint detection and description.
//!
//! The default extractor is a SIFT-like pipeline: FAST-9 corners on a small
//! Gaussian pyramid, a dominant gradient orientation per keypoint and a
//! 4x4x8 gradient histogram descriptor sampled in the rotated frame.

pub mod descriptor;
pub mod detector;
pub mod pyramid;

use image::GrayImage;
use rayon::prelude::*;

use crate::config::FeatureConfig;

pub use descriptor::{DESCRIPTOR_BORDER, DESCRIPTOR_SIZE};

/// A detected keypoint, in full-resolution pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub p2d: glam::Vec2,
    pub response: f32,
    /// Dominant gradient orientation in radians.
    pub angle: f32,
    pub octave: usize,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Keypoint {
        Keypoint {
            p2d: glam::Vec2::new(x, y),
            response: 0.0,
            angle: 0.0,
            octave: 0,
        }
    }
}

/// Row-major set of fixed-length descriptors, one row per keypoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Descriptors {
    dim: usize,
    data: Vec<f32>,
}

impl Descriptors {
    pub fn new(dim: usize) -> Descriptors {
        Descriptors {
            dim,
            data: Vec::new(),
        }
    }

    /// Panics if `data.len()` is not a multiple of `dim`.
    pub fn from_flat(dim: usize, data: Vec<f32>) -> Descriptors {
        assert!(
            (dim == 0 && data.is_empty()) || (dim > 0 && data.len() % dim == 0),
            "descriptor data length {} is not a multiple of {}",
            data.len(),
            dim
        );
        Descriptors { dim, data }
    }

    pub fn from_rows(rows: &[Vec<f32>]) -> Descriptors {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut out = Descriptors::new(dim);
        for r in rows {
            out.push(r);
        }
        out
    }

    pub fn push(&mut self, row: &[f32]) {
        assert_eq!(row.len(), self.dim, "descriptor length mismatch");
        self.data.extend_from_slice(row);
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim.max(1))
    }
}

#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Keypoints and their descriptors; `keypoints[i]` owns `descriptors.row(i)`.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Descriptors,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    /// A set without descriptors counts as no features at all.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

pub trait FeatureExtractor: Sync {
    fn detect_and_compute(&self, image: &GrayImage) -> FeatureSet;
}

/// SIFT-like extractor over a Gaussian pyramid.
#[derive(Debug, Clone, Default)]
pub struct GradientHistogramExtractor {
    config: FeatureConfig,
}

impl GradientHistogramExtractor {
    pub fn new(config: FeatureConfig) -> GradientHistogramExtractor {
        GradientHistogramExtractor { config }
    }
}

impl FeatureExtractor for GradientHistogramExtractor {
    fn detect_and_compute(&self, image: &GrayImage) -> FeatureSet {
        let levels = pyramid::build(image, self.config.octaves, self.config.blur_sigma);

        let mut candidates: Vec<(usize, detector::ScoredCorner)> = levels
            .iter()
            .enumerate()
            .flat_map(|(level_idx, level)| {
                detector::detect_corners(
                    &level.image,
                    self.config.fast_threshold,
                    DESCRIPTOR_BORDER,
                )
                .into_iter()
                .map(move |c| (level_idx, c))
            })
            .collect();

        if self.config.max_features > 0 && candidates.len() > self.config.max_features {
            candidates.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));
            candidates.truncate(self.config.max_features);
            candidates.sort_by_key(|(level_idx, c)| (*level_idx, c.y, c.x));
        }

        let described: Vec<(Keypoint, Vec<f32>)> = candidates
            .par_iter()
            .map(|(level_idx, corner)| {
                let level = &levels[*level_idx];
                let (x, y) = (corner.x as f32, corner.y as f32);
                let angle = descriptor::dominant_orientation(level, x, y);
                let desc = descriptor::describe(level, x, y, angle);
                let kp = Keypoint {
                    p2d: glam::Vec2::new(x * level.scale, y * level.scale),
                    response: corner.score,
                    angle,
                    octave: level.octave,
                };
                (kp, desc)
            })
            .collect();

        let mut descriptors = Descriptors::new(DESCRIPTOR_SIZE);
        let keypoints: Vec<Keypoint> = described
            .into_iter()
            .map(|(kp, desc)| {
                descriptors.push(&desc);
                kp
            })
            .collect();
        log::trace!(
            "extracted {} keypoints over {} levels",
            descriptors.len(),
            levels.len()
        );
        FeatureSet {
            keypoints,
            descriptors,
        }
    }
}
