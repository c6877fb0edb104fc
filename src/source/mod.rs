//! Frame sources. At most one is held open by the application at a time and
//! its handle is released when the boxed source is dropped.

#[cfg(feature = "camera")]
pub mod camera;
pub mod gif;
pub mod sequence;
#[cfg(feature = "video")]
pub mod video;

use std::fmt;
use std::path::Path;

use image::RgbImage;

use crate::error::{Result, TrackerError};

pub use gif::GifSource;
pub use sequence::ImageSequence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    File,
    Camera,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::File => write!(f, "file"),
            SourceKind::Camera => write!(f, "camera"),
        }
    }
}

pub trait FrameSource {
    fn kind(&self) -> SourceKind;

    /// Human readable origin, for logs and reports.
    fn describe(&self) -> String;

    /// Total number of frames when known up front.
    fn len_hint(&self) -> Option<usize> {
        None
    }

    /// `Ok(None)` once the stream has no more frames.
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Opens sources by path or device index.
pub trait SourceOpener {
    fn open_file(&mut self, path: &Path) -> Result<Box<dyn FrameSource>>;
    fn open_camera(&mut self, index: usize) -> Result<Box<dyn FrameSource>>;
}

/// Opens real files and, with the `camera` feature, V4L2 devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl SourceOpener for SystemOpener {
    fn open_file(&mut self, path: &Path) -> Result<Box<dyn FrameSource>> {
        open_file(path)
    }

    fn open_camera(&mut self, index: usize) -> Result<Box<dyn FrameSource>> {
        #[cfg(feature = "camera")]
        {
            Ok(Box::new(camera::CameraSource::open(index)?))
        }
        #[cfg(not(feature = "camera"))]
        {
            Err(TrackerError::CameraUnavailable {
                index,
                reason: "built without the `camera` feature".to_string(),
            })
        }
    }
}

/// Extensions routed to the gstreamer decoder.
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mkv", "mov"];

/// A directory is read as an image sequence, a `.gif` as an animation and
/// a video container through gstreamer.
pub fn open_file(path: &Path) -> Result<Box<dyn FrameSource>> {
    if path.is_dir() {
        return Ok(Box::new(ImageSequence::open(path)?));
    }
    if !path.exists() {
        return Err(TrackerError::UnsupportedSource {
            path: path.to_path_buf(),
            reason: "no such file or directory".to_string(),
        });
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("gif") => Ok(Box::new(GifSource::open(path)?)),
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => open_video(path),
        _ => Err(TrackerError::UnsupportedSource {
            path: path.to_path_buf(),
            reason: format!(
                "expected a video ({}), an image-sequence directory or an animated gif",
                VIDEO_EXTENSIONS.join("/")
            ),
        }),
    }
}

#[cfg(feature = "video")]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(video::VideoFileSource::open(path)?))
}

#[cfg(not(feature = "video"))]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>> {
    Err(TrackerError::UnsupportedSource {
        path: path.to_path_buf(),
        reason: "built without the `video` feature".to_string(),
    })
}
