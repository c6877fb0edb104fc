#![allow(dead_code)]

use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Random 8x8 blocks of intensity, rich in corners.
pub fn textured_template(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let bw = width.div_ceil(8);
    let bh = height.div_ceil(8);
    let blocks: Vec<u8> = (0..bw * bh).map(|_| rng.random_range(0..=255u8)).collect();
    GrayImage::from_fn(width, height, |x, y| Luma([blocks[((y / 8) * bw + x / 8) as usize]]))
}

/// Black RGB canvas with `template` copied in at `(ox, oy)`.
pub fn paste_on_canvas(
    template: &GrayImage,
    width: u32,
    height: u32,
    ox: u32,
    oy: u32,
) -> RgbImage {
    let mut canvas = RgbImage::new(width, height);
    for (x, y, p) in template.enumerate_pixels() {
        let v = p[0];
        canvas.put_pixel(x + ox, y + oy, Rgb([v, v, v]));
    }
    canvas
}
