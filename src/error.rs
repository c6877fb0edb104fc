use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode image: {0}")]
    ImageEncode(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unsupported video source {path}: {reason}")]
    UnsupportedSource { path: PathBuf, reason: String },

    #[error("video decode failed: {0}")]
    VideoDecode(String),

    #[error("camera {index} unavailable: {reason}")]
    CameraUnavailable { index: usize, reason: String },

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("viewer error: {0}")]
    Viewer(String),

    #[error("frame pump worker failed: {0}")]
    Worker(String),
}

impl TrackerError {
    pub fn decode(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        TrackerError::ImageDecode {
            path: path.into(),
            source,
        }
    }
}
