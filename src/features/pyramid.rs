use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;

use super::DESCRIPTOR_BORDER;

/// One blurred pyramid level with its central-difference gradients.
pub struct ScaleLevel {
    pub octave: usize,
    /// Factor mapping level pixels back to full-resolution pixels.
    pub scale: f32,
    pub image: GrayImage,
    pub grad_x: Vec<f32>,
    pub grad_y: Vec<f32>,
}

impl ScaleLevel {
    fn new(octave: usize, image: GrayImage) -> ScaleLevel {
        let (grad_x, grad_y) = gradients(&image);
        ScaleLevel {
            octave,
            scale: (1u32 << octave) as f32,
            image,
            grad_x,
            grad_y,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Gradient at an integer pixel, zero outside the image.
    #[inline]
    pub fn gradient_at(&self, x: i32, y: i32) -> (f32, f32) {
        if x < 0 || y < 0 || x >= self.width() as i32 || y >= self.height() as i32 {
            return (0.0, 0.0);
        }
        let idx = y as usize * self.width() as usize + x as usize;
        (self.grad_x[idx], self.grad_y[idx])
    }

    /// Bilinearly interpolated gradient.
    pub fn gradient_bilinear(&self, x: f32, y: f32) -> (f32, f32) {
        let x0 = x.floor();
        let y0 = y.floor();
        let ax = x - x0;
        let ay = y - y0;
        let (x0, y0) = (x0 as i32, y0 as i32);
        let g00 = self.gradient_at(x0, y0);
        let g10 = self.gradient_at(x0 + 1, y0);
        let g01 = self.gradient_at(x0, y0 + 1);
        let g11 = self.gradient_at(x0 + 1, y0 + 1);
        let w00 = (1.0 - ax) * (1.0 - ay);
        let w10 = ax * (1.0 - ay);
        let w01 = (1.0 - ax) * ay;
        let w11 = ax * ay;
        (
            g00.0 * w00 + g10.0 * w10 + g01.0 * w01 + g11.0 * w11,
            g00.1 * w00 + g10.1 * w10 + g01.1 * w01 + g11.1 * w11,
        )
    }
}

fn blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma > 0.0 {
        gaussian_blur_f32(image, sigma)
    } else {
        image.clone()
    }
}

/// Keeps every other pixel in both directions.
fn decimate(image: &GrayImage) -> GrayImage {
    let w = image.width() / 2;
    let h = image.height() / 2;
    GrayImage::from_fn(w, h, |x, y| *image.get_pixel(x * 2, y * 2))
}

fn gradients(image: &GrayImage) -> (Vec<f32>, Vec<f32>) {
    let w = image.width() as usize;
    let h = image.height() as usize;
    let raw = image.as_raw();
    let mut gx = vec![0.0f32; w * h];
    let mut gy = vec![0.0f32; w * h];
    for y in 0..h {
        let ym = y.saturating_sub(1);
        let yp = (y + 1).min(h - 1);
        for x in 0..w {
            let xm = x.saturating_sub(1);
            let xp = (x + 1).min(w - 1);
            gx[y * w + x] = (raw[y * w + xp] as f32 - raw[y * w + xm] as f32) * 0.5;
            gy[y * w + x] = (raw[yp * w + x] as f32 - raw[ym * w + x] as f32) * 0.5;
        }
    }
    (gx, gy)
}

/// Builds at most `octaves` levels; levels too small to hold a single
/// descriptor window are not created.
pub fn build(gray: &GrayImage, octaves: usize, sigma: f32) -> Vec<ScaleLevel> {
    let min_side = 2 * DESCRIPTOR_BORDER + 1;
    let mut levels = Vec::with_capacity(octaves);
    if octaves == 0 || gray.width() < min_side || gray.height() < min_side {
        return levels;
    }
    let mut current = blur(gray, sigma);
    for octave in 0..octaves {
        let next = if octave + 1 < octaves {
            Some(blur(&decimate(&current), sigma))
        } else {
            None
        };
        levels.push(ScaleLevel::new(octave, current));
        match next {
            Some(img) if img.width() >= min_side && img.height() >= min_side => current = img,
            _ => break,
        }
    }
    levels
}
