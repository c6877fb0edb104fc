use nalgebra as na;

/// Hartley normalisation: centroid to the origin, mean distance sqrt(2).
fn normalize_points(points: &[glam::Vec2]) -> (Vec<na::Vector2<f64>>, na::Matrix3<f64>) {
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
    let (cx, cy) = (sx / n, sy / n);
    let mean_dist = points
        .iter()
        .map(|p| ((p.x as f64 - cx).powi(2) + (p.y as f64 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > f64::EPSILON {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = na::Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = points
        .iter()
        .map(|p| na::Vector2::new(s * (p.x as f64 - cx), s * (p.y as f64 - cy)))
        .collect();
    (normalized, t)
}

/// Direct linear transform for `dst ~ H * src` over four or more pairs.
///
/// Returns `None` for fewer than four pairs or a degenerate configuration.
/// The result is scaled so that `H[(2, 2)] == 1`.
pub fn homography_dlt(src: &[glam::Vec2], dst: &[glam::Vec2]) -> Option<na::Matrix3<f64>> {
    if src.len() < 4 || src.len() != dst.len() {
        return None;
    }
    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);

    let mut ata = na::SMatrix::<f64, 9, 9>::zeros();
    for (p, q) in src_n.iter().zip(&dst_n) {
        let (x, y) = (p.x, p.y);
        let (u, v) = (q.x, q.y);
        let r1 = na::SVector::<f64, 9>::from_column_slice(&[
            -x,
            -y,
            -1.0,
            0.0,
            0.0,
            0.0,
            u * x,
            u * y,
            u,
        ]);
        let r2 = na::SVector::<f64, 9>::from_column_slice(&[
            0.0,
            0.0,
            0.0,
            -x,
            -y,
            -1.0,
            v * x,
            v * y,
            v,
        ]);
        ata += r1 * r1.transpose();
        ata += r2 * r2.transpose();
    }

    let eigen = na::SymmetricEigen::new(ata);
    let (min_idx, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let h = eigen.eigenvectors.column(min_idx);
    let h_norm = na::Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst.try_inverse()?;
    let h_mat = t_dst_inv * h_norm * t_src;
    let scale = h_mat[(2, 2)];
    if scale.abs() < 1e-12 {
        return None;
    }
    let h_mat = h_mat / scale;
    if h_mat.iter().all(|v| v.is_finite()) && h_mat.determinant().abs() > 1e-12 {
        Some(h_mat)
    } else {
        None
    }
}

/// Maps one point through `h`; `None` when it lands at infinity.
pub fn project(h: &na::Matrix3<f64>, p: glam::Vec2) -> Option<glam::Vec2> {
    let r = h * na::Vector3::new(p.x as f64, p.y as f64, 1.0);
    if r[2].abs() < 1e-12 {
        None
    } else {
        Some(glam::Vec2::new((r[0] / r[2]) as f32, (r[1] / r[2]) as f32))
    }
}

/// Maps every point through `h`; `None` if any of them lands at infinity.
pub fn perspective_transform(
    h: &na::Matrix3<f64>,
    points: &[glam::Vec2],
) -> Option<Vec<glam::Vec2>> {
    points.iter().map(|p| project(h, *p)).collect()
}

/// Distance in destination pixels between `H * src` and `dst`.
pub fn transfer_error(h: &na::Matrix3<f64>, src: glam::Vec2, dst: glam::Vec2) -> f64 {
    let r = h * na::Vector3::new(src.x as f64, src.y as f64, 1.0);
    if r[2].abs() < 1e-12 {
        return f64::INFINITY;
    }
    let dx = r[0] / r[2] - dst.x as f64;
    let dy = r[1] / r[2] - dst.y as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Template corners in drawing order: top-left, bottom-left, bottom-right, top-right.
pub fn image_corners(width: u32, height: u32) -> [glam::Vec2; 4] {
    let w = width.saturating_sub(1) as f32;
    let h = height.saturating_sub(1) as f32;
    [
        glam::Vec2::new(0.0, 0.0),
        glam::Vec2::new(0.0, h),
        glam::Vec2::new(w, h),
        glam::Vec2::new(w, 0.0),
    ]
}
