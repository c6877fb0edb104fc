use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::config::{MatchColoring, RenderConfig};
use crate::features::Keypoint;
use crate::matching::DMatch;

const ENDPOINT_RADIUS: i32 = 3;

pub fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    DynamicImage::ImageLuma8(gray.clone()).to_rgb8()
}

/// Stable pseudo-random colour for an integer label.
pub fn id_to_color(id: usize) -> Rgb<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(id as u64);
    let color_num = rng.random_range(0..2u32.pow(24));
    Rgb([
        ((color_num >> 16) % 256) as u8,
        ((color_num >> 8) % 256) as u8,
        (color_num % 256) as u8,
    ])
}

/// Closed polygon through `corners`, `thickness` pixels wide. Edges are
/// clipped to the canvas first, so far off-canvas corners cost no more than
/// visible ones.
pub fn draw_polygon(
    image: &mut RgbImage,
    corners: &[glam::Vec2],
    color: Rgb<u8>,
    thickness: u32,
) {
    if corners.len() < 2 {
        return;
    }
    let t = thickness.max(1) as i32;
    let lo = -(t - 1) / 2;
    let hi = lo + t - 1;
    // one pixel of slack so edges on the border keep their full width
    let min = glam::DVec2::splat(-1.0);
    let max = glam::DVec2::new(image.width() as f64, image.height() as f64);
    for i in 0..corners.len() {
        let a = corners[i].as_dvec2();
        let b = corners[(i + 1) % corners.len()].as_dvec2();
        for dy in lo..=hi {
            for dx in lo..=hi {
                let offset = glam::DVec2::new(dx as f64, dy as f64);
                let Some((p, q)) = clip_segment(a + offset, b + offset, min, max) else {
                    continue;
                };
                draw_line_segment_mut(
                    image,
                    (p.x as f32, p.y as f32),
                    (q.x as f32, q.y as f32),
                    color,
                );
            }
        }
    }
}

/// Liang-Barsky clip of segment `a`-`b` to the box `[min, max]`.
pub fn clip_segment(
    a: glam::DVec2,
    b: glam::DVec2,
    min: glam::DVec2,
    max: glam::DVec2,
) -> Option<(glam::DVec2, glam::DVec2)> {
    if !a.is_finite() || !b.is_finite() {
        return None;
    }
    let d = b - a;
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    let bounds = [
        (-d.x, a.x - min.x),
        (d.x, max.x - a.x),
        (-d.y, a.y - min.y),
        (d.y, max.y - a.y),
    ];
    for (p, q) in bounds {
        if p == 0.0 {
            // parallel to this edge
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((a + d * t0, a + d * t1))
}

/// Small circles at keypoint positions, coloured by pyramid octave.
pub fn draw_keypoints(image: &mut RgbImage, keypoints: &[Keypoint]) {
    for kp in keypoints {
        let center = (kp.p2d.x.round() as i32, kp.p2d.y.round() as i32);
        draw_hollow_circle_mut(image, center, ENDPOINT_RADIUS, id_to_color(kp.octave));
    }
}

/// Template on the left, frame on the right, one line per match joining the
/// two keypoints. Keypoints without a match are not drawn.
pub fn draw_matches(
    template: &GrayImage,
    template_keypoints: &[Keypoint],
    frame: &RgbImage,
    frame_keypoints: &[Keypoint],
    matches: &[DMatch],
    style: &RenderConfig,
) -> RgbImage {
    let (tw, th) = template.dimensions();
    let (fw, fh) = frame.dimensions();
    let mut canvas = RgbImage::new(tw + fw, th.max(fh));
    imageops::replace(&mut canvas, &gray_to_rgb(template), 0, 0);
    imageops::replace(&mut canvas, frame, tw as i64, 0);

    let max_distance = matches
        .iter()
        .map(|m| m.distance)
        .fold(0.0f32, f32::max);
    for m in matches {
        let (Some(q), Some(t)) = (
            template_keypoints.get(m.query_idx),
            frame_keypoints.get(m.train_idx),
        ) else {
            continue;
        };
        let color = match_color(m.distance, max_distance, style);
        let start = (q.p2d.x, q.p2d.y);
        let end = (t.p2d.x + tw as f32, t.p2d.y);
        draw_line_segment_mut(&mut canvas, start, end, color);
        draw_hollow_circle_mut(
            &mut canvas,
            (start.0.round() as i32, start.1.round() as i32),
            ENDPOINT_RADIUS,
            color,
        );
        draw_hollow_circle_mut(
            &mut canvas,
            (end.0.round() as i32, end.1.round() as i32),
            ENDPOINT_RADIUS,
            color,
        );
    }
    canvas
}

fn match_color(distance: f32, max_distance: f32, style: &RenderConfig) -> Rgb<u8> {
    match style.match_coloring {
        MatchColoring::Uniform => Rgb(style.match_color),
        MatchColoring::ByDistance => {
            let t = if max_distance > 0.0 {
                (distance / max_distance) as f64
            } else {
                0.0
            };
            let c = colorous::VIRIDIS.eval_continuous(1.0 - t.clamp(0.0, 1.0));
            Rgb([c.r, c.g, c.b])
        }
    }
}

/// Scales `image` to fit `width` x `height` with its aspect ratio kept and
/// centres it on a black canvas of exactly that size.
pub fn fit_to_viewport(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let mut canvas = RgbImage::new(width, height);
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || width == 0 || height == 0 {
        return canvas;
    }
    let scale = (width as f64 / w as f64).min(height as f64 / h as f64);
    let nw = ((w as f64 * scale).round() as u32).clamp(1, width);
    let nh = ((h as f64 * scale).round() as u32).clamp(1, height);
    let resized = if (nw, nh) == (w, h) {
        image.clone()
    } else {
        imageops::resize(image, nw, nh, FilterType::Triangle)
    };
    imageops::replace(
        &mut canvas,
        &resized,
        ((width - nw) / 2) as i64,
        ((height - nh) / 2) as i64,
    );
    canvas
}

#[cfg(feature = "viewer")]
pub fn log_image_as_compressed(
    recording: &rerun::RecordingStream,
    topic: &str,
    img: &RgbImage,
    format: image::ImageFormat,
) -> crate::error::Result<()> {
    let mut bytes: Vec<u8> = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), format)?;
    let archetype = rerun::Image::from_file_contents(bytes, None)
        .map_err(|e| crate::error::TrackerError::Viewer(e.to_string()))?;
    recording
        .log(format!("{}/image", topic), &archetype)
        .map_err(|e| crate::error::TrackerError::Viewer(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_thickness_covers_neighbouring_rows() {
        let mut img = RgbImage::new(40, 40);
        let square = [
            glam::Vec2::new(10.0, 10.0),
            glam::Vec2::new(10.0, 30.0),
            glam::Vec2::new(30.0, 30.0),
            glam::Vec2::new(30.0, 10.0),
        ];
        draw_polygon(&mut img, &square, Rgb([0, 255, 0]), 3);
        for y in 9..=11 {
            assert_eq!(img.get_pixel(20, y), &Rgb([0, 255, 0]));
        }
        assert_eq!(img.get_pixel(20, 13), &Rgb([0, 0, 0]));
        assert_eq!(img.get_pixel(20, 20), &Rgb([0, 0, 0]));
    }

    #[test]
    fn segments_are_clipped_to_the_box() {
        let (min, max) = (glam::DVec2::ZERO, glam::DVec2::new(100.0, 50.0));
        let inside = (glam::DVec2::new(10.0, 10.0), glam::DVec2::new(90.0, 40.0));
        assert_eq!(clip_segment(inside.0, inside.1, min, max), Some(inside));

        let (p, q) = clip_segment(
            glam::DVec2::new(-50.0, 25.0),
            glam::DVec2::new(1e9, 25.0),
            min,
            max,
        )
        .unwrap();
        assert!(p.abs_diff_eq(glam::DVec2::new(0.0, 25.0), 1e-6), "{:?}", p);
        assert!(q.abs_diff_eq(glam::DVec2::new(100.0, 25.0), 1e-6), "{:?}", q);

        let outside = clip_segment(
            glam::DVec2::new(-10.0, -10.0),
            glam::DVec2::new(200.0, -5.0),
            min,
            max,
        );
        assert_eq!(outside, None);
        let infinite = glam::DVec2::new(f64::INFINITY, 0.0);
        assert_eq!(clip_segment(infinite, inside.0, min, max), None);
    }

    #[test]
    fn same_id_same_color() {
        assert_eq!(id_to_color(3), id_to_color(3));
    }
}
