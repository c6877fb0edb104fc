use nalgebra as na;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::homography::{homography_dlt, transfer_error};
use crate::config::PoseConfig;

const SAMPLE_SIZE: usize = 4;

/// A robustly fitted homography and which input pairs agree with it.
#[derive(Debug, Clone, PartialEq)]
pub struct HomographyEstimate {
    pub matrix: na::Matrix3<f64>,
    pub inliers: Vec<bool>,
}

impl HomographyEstimate {
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&i| i).count()
    }
}

/// RANSAC over minimal four-point samples, followed by a DLT refit on the
/// consensus set.
///
/// Returns `None` when fewer than four pairs are given or no sample yields
/// a model with at least four inliers.
pub fn find_homography(
    src: &[glam::Vec2],
    dst: &[glam::Vec2],
    config: &PoseConfig,
) -> Option<HomographyEstimate> {
    let n = src.len();
    if n < SAMPLE_SIZE || n != dst.len() {
        return None;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut best: Option<(na::Matrix3<f64>, Vec<bool>, usize)> = None;
    let mut max_iterations = config.max_iterations.max(1);
    let mut iteration = 0;

    while iteration < max_iterations {
        iteration += 1;
        let sample = rand::seq::index::sample(&mut rng, n, SAMPLE_SIZE).into_vec();
        let s_src: Vec<glam::Vec2> = sample.iter().map(|&i| src[i]).collect();
        let s_dst: Vec<glam::Vec2> = sample.iter().map(|&i| dst[i]).collect();
        if has_collinear_triplet(&s_src) || has_collinear_triplet(&s_dst) {
            continue;
        }
        let Some(model) = homography_dlt(&s_src, &s_dst) else {
            continue;
        };
        let (mask, count) = consensus(&model, src, dst, config.ransac_threshold);
        if best.as_ref().is_none_or(|b| count > b.2) {
            max_iterations = max_iterations.min(required_iterations(
                config.confidence,
                count as f64 / n as f64,
                config.max_iterations.max(1),
            ));
            best = Some((model, mask, count));
        }
    }

    let (model, mask, count) = best?;
    if count < SAMPLE_SIZE {
        return None;
    }
    log::trace!("ransac: {count}/{n} inliers after {iteration} iterations");

    let in_src: Vec<glam::Vec2> = (0..n).filter(|&i| mask[i]).map(|i| src[i]).collect();
    let in_dst: Vec<glam::Vec2> = (0..n).filter(|&i| mask[i]).map(|i| dst[i]).collect();
    if let Some(refined) = homography_dlt(&in_src, &in_dst) {
        let (refined_mask, refined_count) = consensus(&refined, src, dst, config.ransac_threshold);
        if refined_count >= count {
            return Some(HomographyEstimate {
                matrix: refined,
                inliers: refined_mask,
            });
        }
    }
    Some(HomographyEstimate {
        matrix: model,
        inliers: mask,
    })
}

fn consensus(
    model: &na::Matrix3<f64>,
    src: &[glam::Vec2],
    dst: &[glam::Vec2],
    threshold: f64,
) -> (Vec<bool>, usize) {
    let mask: Vec<bool> = src
        .iter()
        .zip(dst)
        .map(|(s, d)| transfer_error(model, *s, *d) <= threshold)
        .collect();
    let count = mask.iter().filter(|&&m| m).count();
    (mask, count)
}

/// Samples needed to draw one all-inlier set with probability `confidence`.
fn required_iterations(confidence: f64, inlier_ratio: f64, max_iterations: usize) -> usize {
    let p_good = inlier_ratio.powi(SAMPLE_SIZE as i32);
    if p_good >= 1.0 {
        return 1;
    }
    if p_good <= 0.0 {
        return max_iterations;
    }
    let num = (1.0 - confidence).max(f64::MIN_POSITIVE).ln();
    let denom = (1.0 - p_good).ln();
    if denom >= 0.0 || num / denom >= max_iterations as f64 {
        max_iterations
    } else {
        (num / denom).ceil().max(1.0) as usize
    }
}

fn has_collinear_triplet(points: &[glam::Vec2]) -> bool {
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            for k in (j + 1)..points.len() {
                let a = points[j] - points[i];
                let b = points[k] - points[i];
                let area = a.perp_dot(b).abs();
                let scale = a.length() * b.length();
                if area <= 1e-3 * scale.max(1.0) {
                    return true;
                }
            }
        }
    }
    false
}
