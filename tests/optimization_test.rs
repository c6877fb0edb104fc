use glam::Vec2;
use nalgebra as na;
use planar_tracker::config::PoseConfig;
use planar_tracker::optimization::{
    find_homography, homography_dlt, image_corners, perspective_transform, project,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn ground_truth() -> na::Matrix3<f64> {
    na::Matrix3::new(1.1, 0.05, 30.0, -0.03, 0.95, 12.0, 1e-4, -2e-4, 1.0)
}

fn grid_points() -> Vec<Vec2> {
    let mut pts = Vec::new();
    for y in 0..6 {
        for x in 0..8 {
            pts.push(Vec2::new(x as f32 * 37.0 + 5.0, y as f32 * 29.0 + 3.0));
        }
    }
    pts
}

fn assert_close(a: &na::Matrix3<f64>, b: &na::Matrix3<f64>, tol: f64) {
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < tol, "{} vs {}\n{}\n{}", x, y, a, b);
    }
}

#[test]
fn test_dlt_recovers_exact_homography() {
    let h = ground_truth();
    let src = grid_points();
    let dst: Vec<Vec2> = src.iter().map(|p| project(&h, *p).unwrap()).collect();
    let solved = homography_dlt(&src, &dst).unwrap();
    assert_close(&solved, &h, 1e-3);
}

#[test]
fn test_dlt_needs_four_points() {
    let src = grid_points();
    assert!(homography_dlt(&src[..3], &src[..3]).is_none());
}

#[test]
fn test_ransac_ignores_outliers() {
    let h = ground_truth();
    let src = grid_points();
    let mut dst: Vec<Vec2> = src.iter().map(|p| project(&h, *p).unwrap()).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let outliers = [1usize, 7, 12, 20, 33, 40, 41];
    for &i in &outliers {
        let dx = rng.random_range(30.0..80.0);
        let dy = rng.random_range(30.0..80.0);
        dst[i] += Vec2::new(dx, -dy);
    }
    let estimate = find_homography(&src, &dst, &PoseConfig::default()).unwrap();
    assert_close(&estimate.matrix, &h, 1e-2);
    for &i in &outliers {
        assert!(!estimate.inliers[i]);
    }
    assert_eq!(estimate.inlier_count(), src.len() - outliers.len());
}

#[test]
fn test_ransac_too_few_pairs() {
    let src = grid_points();
    assert!(find_homography(&src[..3], &src[..3], &PoseConfig::default()).is_none());
}

#[test]
fn test_ransac_collinear_input_has_no_model() {
    let src: Vec<Vec2> = (0..10).map(|i| Vec2::new(i as f32 * 10.0, 5.0)).collect();
    let config = PoseConfig {
        max_iterations: 50,
        ..Default::default()
    };
    assert!(find_homography(&src, &src, &config).is_none());
}

#[test]
fn test_translation_moves_corners() {
    let h = na::Matrix3::new(1.0, 0.0, 40.0, 0.0, 1.0, 30.0, 0.0, 0.0, 1.0);
    let corners = image_corners(200, 150);
    assert_eq!(corners[2], Vec2::new(199.0, 149.0));
    let moved = perspective_transform(&h, &corners).unwrap();
    assert_eq!(moved[0], Vec2::new(40.0, 30.0));
    assert_eq!(moved[1], Vec2::new(40.0, 179.0));
    assert_eq!(moved[2], Vec2::new(239.0, 179.0));
    assert_eq!(moved[3], Vec2::new(239.0, 30.0));
}

#[test]
fn test_points_at_infinity() {
    let h = na::Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0);
    assert!(perspective_transform(&h, &[Vec2::new(0.0, 4.0)]).is_none());
}
