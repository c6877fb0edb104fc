use image::GrayImage;
use imageproc::corners::corners_fast9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCorner {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// FAST-9 corners with 3x3 non-maximum suppression, dropping anything
/// within `border` pixels of the image edge.
///
/// Equal scores are resolved in raster order so the result only depends on
/// the local neighbourhood of each corner.
pub fn detect_corners(image: &GrayImage, threshold: u8, border: u32) -> Vec<ScoredCorner> {
    let (w, h) = image.dimensions();
    if w <= 2 * border || h <= 2 * border {
        return Vec::new();
    }
    let corners = corners_fast9(image, threshold);
    let mut score_map = vec![f32::NEG_INFINITY; (w * h) as usize];
    for c in &corners {
        score_map[(c.y * w + c.x) as usize] = c.score;
    }

    let mut kept: Vec<ScoredCorner> = corners
        .iter()
        .filter(|c| c.x >= border && c.y >= border && c.x < w - border && c.y < h - border)
        .filter(|c| {
            let idx = (c.y * w + c.x) as usize;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = c.x as i32 + dx;
                    let ny = c.y as i32 + dy;
                    if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                        continue;
                    }
                    let n_idx = (ny as u32 * w + nx as u32) as usize;
                    let n_score = score_map[n_idx];
                    if n_score > c.score || (n_score == c.score && n_idx < idx) {
                        return false;
                    }
                }
            }
            true
        })
        .map(|c| ScoredCorner {
            x: c.x,
            y: c.y,
            score: c.score,
        })
        .collect();
    kept.sort_by_key(|c| (c.y, c.x));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn bright_square(size: u32, x0: u32, y0: u32, side: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if x >= x0 && x < x0 + side && y >= y0 && y < y0 + side {
                Luma([220])
            } else {
                Luma([20])
            }
        })
    }

    #[test]
    fn flat_image_has_no_corners() {
        let img = GrayImage::from_pixel(64, 64, Luma([128]));
        assert!(detect_corners(&img, 20, 4).is_empty());
    }

    #[test]
    fn square_corners_are_found_once() {
        let img = bright_square(80, 30, 30, 20);
        let corners = detect_corners(&img, 20, 4);
        assert!(!corners.is_empty());
        for (i, a) in corners.iter().enumerate() {
            for b in corners.iter().skip(i + 1) {
                let close = a.x.abs_diff(b.x) <= 1 && a.y.abs_diff(b.y) <= 1;
                assert!(!close, "adjacent corners survived suppression");
            }
        }
    }

    #[test]
    fn border_corners_are_dropped() {
        let img = bright_square(80, 2, 2, 20);
        let corners = detect_corners(&img, 20, 16);
        assert!(corners.iter().all(|c| c.x >= 16 && c.y >= 16));
    }
}
