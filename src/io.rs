use std::io::Write;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};
use serde::{Serialize, de::DeserializeOwned};

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::processor::{Detection, FrameReport};

/// Serializes an object to a JSON file.
pub fn object_to_json<T: Serialize>(output_path: &Path, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(j.as_bytes())?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn load_config(path: &Path) -> Result<TrackerConfig> {
    object_from_json(path)
}

pub fn save_config(path: &Path, config: &TrackerConfig) -> Result<()> {
    object_to_json(path, config)
}

pub fn load_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| TrackerError::decode(path, e))
}

/// First free path among `dir/stem.ext`, `dir/stem_1.ext`, `dir/stem_2.ext`, ...
pub fn next_screenshot_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let first = dir.join(format!("{}.{}", stem, ext));
    if !first.exists() {
        return first;
    }
    let mut suffix = 1usize;
    loop {
        let candidate = dir.join(format!("{}_{}.{}", stem, suffix, ext));
        if !candidate.exists() {
            return candidate;
        }
        suffix += 1;
    }
}

/// Summary of one tracking session, written next to the rendered frames.
#[derive(Debug, Default, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct SessionReport {
    pub timestamp: String,
    pub source: String,
    pub template_keypoints: usize,
    pub frames: usize,
    pub frames_found: usize,
    pub frames_insufficient: usize,
    pub frames_projection_failed: usize,
    pub frames_without_features: usize,
    pub mean_matches: f64,
}

impl SessionReport {
    pub fn record(&mut self, report: &FrameReport) {
        self.frames += 1;
        match report.detection {
            Detection::Found { .. } => self.frames_found += 1,
            Detection::InsufficientMatches { .. } => self.frames_insufficient += 1,
            Detection::ProjectionFailed { .. } => self.frames_projection_failed += 1,
            Detection::NoFeatures => self.frames_without_features += 1,
            Detection::NoTemplate | Detection::TemplateWithoutFeatures => {}
        }
        self.mean_matches += (report.match_count as f64 - self.mean_matches) / self.frames as f64;
    }
}

pub fn write_session_report(output_path: &Path, report: &SessionReport) -> Result<()> {
    object_to_json(output_path, report)
}

/// Local wall-clock stamp `YYYYmmdd_HHMMSS`, UTC when the local offset is unknown.
pub fn timestamp_string() -> String {
    let now =
        time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
