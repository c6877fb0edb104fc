use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use gstreamer::prelude::*;
use image::RgbImage;

use super::{FrameSource, SourceKind};
use crate::error::{Result, TrackerError};

const PIPELINE: &str = "filesrc name=src ! decodebin ! queue ! videoconvert ! \
                        video/x-raw,format=RGBA ! appsink name=videosink sync=false";
/// Decoded frames buffered ahead of the reader before decoding blocks.
const MAX_QUEUED_FRAMES: u32 = 2;
const PREROLL_TIMEOUT: Duration = Duration::from_secs(5);
const SAMPLE_TIMEOUT_SECS: u64 = 3;

/// A video container decoded by gstreamer. Frames are pulled in order as
/// fast as the reader asks for them.
pub struct VideoFileSource {
    path: PathBuf,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    failed: bool,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> Result<VideoFileSource> {
        let unsupported = |reason: String| TrackerError::UnsupportedSource {
            path: path.to_path_buf(),
            reason,
        };
        gstreamer::init().map_err(|e| unsupported(format!("gstreamer init failed: {}", e)))?;

        let pipeline = gstreamer::parse::launch(PIPELINE)
            .map_err(|e| unsupported(e.to_string()))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| unsupported("decoder is not a pipeline".to_string()))?;
        let filesrc = pipeline
            .by_name("src")
            .ok_or_else(|| unsupported("pipeline has no file source".to_string()))?;
        filesrc.set_property("location", path.to_string_lossy().as_ref());
        let appsink = pipeline
            .by_name("videosink")
            .ok_or_else(|| unsupported("pipeline has no video sink".to_string()))?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| unsupported("video sink is not an appsink".to_string()))?;
        appsink.set_max_buffers(MAX_QUEUED_FRAMES);

        // From here on, dropping the source shuts the pipeline down.
        let source = VideoFileSource {
            path: path.to_path_buf(),
            pipeline,
            appsink,
            failed: false,
        };
        if let Err(e) = source.pipeline.set_state(gstreamer::State::Playing) {
            return Err(unsupported(
                source.pipeline_error().unwrap_or_else(|| e.to_string()),
            ));
        }
        source.wait_for_preroll().map_err(unsupported)?;
        log::info!("video {} opened", path.display());
        Ok(source)
    }

    /// Blocks until the first frame is decoded, the stream turns out empty,
    /// or the pipeline reports an error.
    fn wait_for_preroll(&self) -> std::result::Result<(), String> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        let deadline = Instant::now() + PREROLL_TIMEOUT;
        while Instant::now() < deadline {
            let Some(msg) = bus.timed_pop(gstreamer::ClockTime::from_mseconds(100)) else {
                continue;
            };
            match msg.view() {
                gstreamer::MessageView::Error(err) => return Err(err.error().to_string()),
                gstreamer::MessageView::AsyncDone(_) | gstreamer::MessageView::Eos(_) => {
                    return Ok(());
                }
                _ => {}
            }
        }
        log::warn!(
            "video {}: no preroll after {:?}",
            self.path.display(),
            PREROLL_TIMEOUT
        );
        Ok(())
    }

    /// First error queued on the pipeline bus, if any.
    fn pipeline_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        while let Some(msg) = bus.pop() {
            if let gstreamer::MessageView::Error(err) = msg.view() {
                return Some(err.error().to_string());
            }
        }
        None
    }

    fn decode_error(&self, reason: impl std::fmt::Display) -> TrackerError {
        TrackerError::VideoDecode(format!("{}: {}", self.path.display(), reason))
    }

    fn sample_to_rgb(&self, sample: &gstreamer::Sample) -> Result<RgbImage> {
        let structure = sample
            .caps()
            .and_then(|caps| caps.structure(0))
            .ok_or_else(|| self.decode_error("sample without caps"))?;
        let width = structure
            .get::<i32>("width")
            .map_err(|e| self.decode_error(e))?;
        let height = structure
            .get::<i32>("height")
            .map_err(|e| self.decode_error(e))?;
        let buffer = sample
            .buffer()
            .ok_or_else(|| self.decode_error("sample without buffer"))?;
        let map = buffer.map_readable().map_err(|e| self.decode_error(e))?;
        rgba_to_rgb(map.as_slice(), width.max(0) as u32, height.max(0) as u32).ok_or_else(|| {
            self.decode_error(format!("short frame buffer for {}x{}", width, height))
        })
    }
}

impl FrameSource for VideoFileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.failed {
            return Ok(None);
        }
        let timeout = gstreamer::ClockTime::from_seconds(SAMPLE_TIMEOUT_SECS);
        match self.appsink.try_pull_sample(timeout) {
            Some(sample) => self.sample_to_rgb(&sample).map(Some),
            None if self.appsink.is_eos() => Ok(None),
            None => match self.pipeline_error() {
                Some(reason) => {
                    // A broken pipeline never reaches EOS, so end playback here.
                    self.failed = true;
                    Err(self.decode_error(reason))
                }
                None => Err(self.decode_error("no frame decoded in time")),
            },
        }
    }
}

impl Drop for VideoFileSource {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            log::debug!("video {}: shutdown failed: {}", self.path.display(), e);
        }
    }
}

/// Packs an RGBA buffer, whose rows may be padded, into an RGB image.
pub fn rgba_to_rgb(data: &[u8], width: u32, height: u32) -> Option<RgbImage> {
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return None;
    }
    let stride = data.len() / h;
    if stride < w * 4 {
        return None;
    }
    let mut rgb = Vec::with_capacity(w * h * 3);
    for row in data.chunks_exact(stride).take(h) {
        for px in row[..w * 4].chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
        }
    }
    RgbImage::from_raw(width, height, rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_rows_drop_alpha() {
        let data = [1, 2, 3, 255, 4, 5, 6, 255, 7, 8, 9, 255, 10, 11, 12, 255];
        let img = rgba_to_rgb(&data, 2, 2).unwrap();
        assert_eq!(img.get_pixel(1, 0).0, [4, 5, 6]);
        assert_eq!(img.get_pixel(0, 1).0, [7, 8, 9]);
    }

    #[test]
    fn padded_rows_are_skipped() {
        // one pixel wide, two bytes of row padding
        let data = [1, 2, 3, 255, 0, 0, 4, 5, 6, 255, 0, 0];
        let img = rgba_to_rgb(&data, 1, 2).unwrap();
        assert_eq!(img.get_pixel(0, 1).0, [4, 5, 6]);
        assert!(rgba_to_rgb(&data[..6], 2, 1).is_none());
    }
}
