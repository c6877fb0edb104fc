use image::RgbImage;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::{FrameSource, SourceKind};
use crate::error::{Result, TrackerError};

const BUFFER_COUNT: u32 = 4;

/// A V4L2 capture device streaming MJPG or YUYV frames.
pub struct CameraSource {
    index: usize,
    width: u32,
    height: u32,
    fourcc: v4l::FourCC,
    // Declared before `_device` so the stream is torn down first.
    stream: MmapStream<'static>,
    _device: Device,
}

impl CameraSource {
    pub fn open(index: usize) -> Result<CameraSource> {
        let unavailable = |reason: String| TrackerError::CameraUnavailable { index, reason };
        let device = Device::new(index).map_err(|e| unavailable(e.to_string()))?;

        let mut format = device.format().map_err(|e| unavailable(e.to_string()))?;
        format.fourcc = v4l::FourCC::new(b"MJPG");
        let format = match device.set_format(&format) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("camera {index}: could not request MJPG ({e}), keeping device format");
                device.format().map_err(|e| unavailable(e.to_string()))?
            }
        };
        let supported = [v4l::FourCC::new(b"MJPG"), v4l::FourCC::new(b"YUYV")];
        if !supported.contains(&format.fourcc) {
            return Err(unavailable(format!("unsupported pixel format {}", format.fourcc)));
        }

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| unavailable(e.to_string()))?;
        log::info!(
            "camera {index} opened: {}x{} {}",
            format.width,
            format.height,
            format.fourcc
        );
        Ok(CameraSource {
            index,
            width: format.width,
            height: format.height,
            fourcc: format.fourcc,
            stream,
            _device: device,
        })
    }
}

impl FrameSource for CameraSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    fn describe(&self) -> String {
        format!("camera {}", self.index)
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let (buf, _meta) = self.stream.next()?;
        if self.fourcc == v4l::FourCC::new(b"MJPG") {
            let img = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                .map_err(|e| TrackerError::decode(format!("camera {}", self.index), e))?;
            Ok(Some(img.to_rgb8()))
        } else {
            Ok(yuyv_to_rgb(buf, self.width, self.height))
        }
    }
}

/// Packed YUYV 4:2:2 to RGB (BT.601). `None` if the buffer is short.
pub fn yuyv_to_rgb(buf: &[u8], width: u32, height: u32) -> Option<RgbImage> {
    let needed = (width * height * 2) as usize;
    if buf.len() < needed {
        return None;
    }
    let mut out = RgbImage::new(width, height);
    for (i, chunk) in buf[..needed].chunks_exact(4).enumerate() {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        for (j, y) in [y0, y1].into_iter().enumerate() {
            let px = (i * 2 + j) as u32;
            let (x, row) = (px % width, px / width);
            out.put_pixel(x, row, image::Rgb(yuv_to_rgb(y, u, v)));
        }
    }
    Some(out)
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        clamp(1.164 * c + 1.596 * e),
        clamp(1.164 * c - 0.392 * d - 0.813 * e),
        clamp(1.164 * c + 2.017 * d),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grey_yuyv_stays_grey() {
        let buf = [128u8, 128, 128, 128].repeat(8);
        let img = yuyv_to_rgb(&buf, 4, 4).unwrap();
        let p = img.get_pixel(3, 3);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert!(yuyv_to_rgb(&[0u8; 10], 4, 4).is_none());
    }
}
