use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, Frames, RgbImage};

use super::{FrameSource, SourceKind};
use crate::error::{Result, TrackerError};

/// Composited frames of an animated GIF.
pub struct GifSource {
    path: PathBuf,
    frames: Frames<'static>,
}

impl GifSource {
    pub fn open(path: &Path) -> Result<GifSource> {
        let reader = BufReader::new(File::open(path)?);
        let decoder = GifDecoder::new(reader).map_err(|e| TrackerError::decode(path, e))?;
        Ok(GifSource {
            path: path.to_path_buf(),
            frames: decoder.into_frames(),
        })
    }
}

impl FrameSource for GifSource {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        match self.frames.next() {
            None => Ok(None),
            Some(frame) => {
                let frame = frame.map_err(|e| TrackerError::decode(&self.path, e))?;
                Ok(Some(DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8()))
            }
        }
    }
}
