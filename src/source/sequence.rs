use std::path::{Path, PathBuf};

use glob::glob;
use image::RgbImage;

use super::{FrameSource, SourceKind};
use crate::error::{Result, TrackerError};
use crate::io::load_image;

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Frames stored as individual images in one directory, played in file name order.
#[derive(Debug)]
pub struct ImageSequence {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageSequence {
    pub fn open(dir: &Path) -> Result<ImageSequence> {
        let pattern = dir.join("*");
        let pattern = pattern.to_string_lossy();
        let unsupported = |reason: String| TrackerError::UnsupportedSource {
            path: dir.to_path_buf(),
            reason,
        };
        let mut paths: Vec<PathBuf> = glob(&pattern)
            .map_err(|e| unsupported(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            })
            .collect();
        paths.sort();
        if paths.is_empty() {
            return Err(unsupported("directory contains no frames".to_string()));
        }
        log::trace!("{} frames in {}", paths.len(), dir.display());
        Ok(ImageSequence {
            dir: dir.to_path_buf(),
            paths,
            next: 0,
        })
    }
}

impl FrameSource for ImageSequence {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.paths.len())
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        Ok(Some(load_image(path)?.to_rgb8()))
    }
}
