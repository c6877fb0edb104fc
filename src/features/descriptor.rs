use std::f32::consts::PI;

use super::pyramid::ScaleLevel;

pub const DESCRIPTOR_SIZE: usize = 128;

/// Keypoints closer than this to a level's edge are not described: the
/// rotated sampling window must stay inside the blurred image.
pub const DESCRIPTOR_BORDER: u32 = 16;

const ORIENTATION_BINS: usize = 36;
const ORIENTATION_RADIUS: i32 = 8;
const ORIENTATION_SIGMA: f32 = 4.0;

const WINDOW: usize = 16;
const CELLS: usize = 4;
const CELL_SIZE: usize = WINDOW / CELLS;
const ANGLE_BINS: usize = 8;
const WINDOW_SIGMA: f32 = WINDOW as f32 / 2.0;
const CLIP: f32 = 0.2;

/// Peak of the Gaussian-weighted gradient orientation histogram around
/// `(x, y)`, refined with a parabola through the neighbouring bins.
pub fn dominant_orientation(level: &ScaleLevel, x: f32, y: f32) -> f32 {
    let mut hist = [0.0f32; ORIENTATION_BINS];
    let (cx, cy) = (x.round() as i32, y.round() as i32);
    let r2 = ORIENTATION_RADIUS * ORIENTATION_RADIUS;
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            let d2 = dx * dx + dy * dy;
            if d2 > r2 {
                continue;
            }
            let (gx, gy) = level.gradient_at(cx + dx, cy + dy);
            let mag = (gx * gx + gy * gy).sqrt();
            if mag == 0.0 {
                continue;
            }
            let theta = gy.atan2(gx) + PI;
            let bin = ((theta / (2.0 * PI)) * ORIENTATION_BINS as f32) as usize % ORIENTATION_BINS;
            let weight = (-(d2 as f32) / (2.0 * ORIENTATION_SIGMA * ORIENTATION_SIGMA)).exp();
            hist[bin] += mag * weight;
        }
    }

    let smoothed: Vec<f32> = (0..ORIENTATION_BINS)
        .map(|i| {
            let prev = hist[(i + ORIENTATION_BINS - 1) % ORIENTATION_BINS];
            let next = hist[(i + 1) % ORIENTATION_BINS];
            0.25 * prev + 0.5 * hist[i] + 0.25 * next
        })
        .collect();

    let mut peak = 0;
    for i in 1..ORIENTATION_BINS {
        if smoothed[i] > smoothed[peak] {
            peak = i;
        }
    }
    let left = smoothed[(peak + ORIENTATION_BINS - 1) % ORIENTATION_BINS];
    let right = smoothed[(peak + 1) % ORIENTATION_BINS];
    let denom = left - 2.0 * smoothed[peak] + right;
    let offset = if denom.abs() > f32::EPSILON {
        0.5 * (left - right) / denom
    } else {
        0.0
    };
    let bin_width = 2.0 * PI / ORIENTATION_BINS as f32;
    (peak as f32 + 0.5 + offset) * bin_width - PI
}

/// 4x4 cells x 8 orientation bins over a 16x16 window rotated by `angle`.
pub fn describe(level: &ScaleLevel, x: f32, y: f32, angle: f32) -> Vec<f32> {
    let mut desc = vec![0.0f32; DESCRIPTOR_SIZE];
    let (sin_a, cos_a) = angle.sin_cos();
    let half = WINDOW as f32 / 2.0 - 0.5;

    for iy in 0..WINDOW {
        for ix in 0..WINDOW {
            let u = ix as f32 - half;
            let v = iy as f32 - half;
            let px = x + cos_a * u - sin_a * v;
            let py = y + sin_a * u + cos_a * v;
            let (gx, gy) = level.gradient_bilinear(px, py);
            let mag = (gx * gx + gy * gy).sqrt();
            if mag == 0.0 {
                continue;
            }
            let mut theta = gy.atan2(gx) - angle;
            theta = theta.rem_euclid(2.0 * PI);
            let weight = (-(u * u + v * v) / (2.0 * WINDOW_SIGMA * WINDOW_SIGMA)).exp();
            let cell = (iy / CELL_SIZE) * CELLS + ix / CELL_SIZE;

            let obin = theta / (2.0 * PI) * ANGLE_BINS as f32;
            let b0 = obin.floor();
            let frac = obin - b0;
            let b0 = b0 as usize % ANGLE_BINS;
            let b1 = (b0 + 1) % ANGLE_BINS;
            desc[cell * ANGLE_BINS + b0] += mag * weight * (1.0 - frac);
            desc[cell * ANGLE_BINS + b1] += mag * weight * frac;
        }
    }

    normalize(&mut desc);
    for d in desc.iter_mut() {
        *d = d.min(CLIP);
    }
    normalize(&mut desc);
    desc
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}
