mod common;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use image::{DynamicImage, Rgb, RgbImage};
use planar_tracker::app::{AppContext, AppEvent};
use planar_tracker::config::TrackerConfig;
use planar_tracker::error::{Result, TrackerError};
use planar_tracker::processor::FrameProcessor;
use planar_tracker::source::{FrameSource, SourceKind, SourceOpener};
use tempfile::TempDir;

/// Shared bookkeeping of how many fake sources are alive.
#[derive(Default)]
struct Tracker {
    live: AtomicUsize,
    opened: AtomicUsize,
    overlapped: AtomicBool,
}

struct FakeSource {
    kind: SourceKind,
    remaining: usize,
    fail_every_other: bool,
    reads: usize,
    tracker: Arc<Tracker>,
}

impl FrameSource for FakeSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn describe(&self) -> String {
        format!("fake {}", self.kind)
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        self.reads += 1;
        if self.fail_every_other && self.reads % 2 == 0 {
            return Err(TrackerError::Io(std::io::Error::other("device busy")));
        }
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(RgbImage::from_pixel(32, 24, Rgb([5, 5, 5]))))
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.tracker.live.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeOpener {
    tracker: Arc<Tracker>,
    file_frames: usize,
    flaky_camera: bool,
}

impl FakeOpener {
    fn make(&self, kind: SourceKind, remaining: usize, flaky: bool) -> Box<dyn FrameSource> {
        if self.tracker.live.fetch_add(1, Ordering::SeqCst) > 0 {
            self.tracker.overlapped.store(true, Ordering::SeqCst);
        }
        self.tracker.opened.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeSource {
            kind,
            remaining,
            fail_every_other: flaky,
            reads: 0,
            tracker: self.tracker.clone(),
        })
    }
}

impl SourceOpener for FakeOpener {
    fn open_file(&mut self, path: &Path) -> Result<Box<dyn FrameSource>> {
        if path.ends_with("missing.avi") {
            return Err(TrackerError::UnsupportedSource {
                path: path.to_path_buf(),
                reason: "not found".to_string(),
            });
        }
        Ok(self.make(SourceKind::File, self.file_frames, false))
    }

    fn open_camera(&mut self, _index: usize) -> Result<Box<dyn FrameSource>> {
        Ok(self.make(SourceKind::Camera, usize::MAX, self.flaky_camera))
    }
}

fn fake_app(file_frames: usize, flaky_camera: bool) -> (AppContext<FakeOpener>, Arc<Tracker>) {
    let tracker = Arc::new(Tracker::default());
    let opener = FakeOpener {
        tracker: tracker.clone(),
        file_frames,
        flaky_camera,
    };
    let app = AppContext::with_opener(FrameProcessor::new(TrackerConfig::default()), opener);
    (app, tracker)
}

#[test]
fn test_source_switching_never_overlaps() {
    let (mut app, tracker) = fake_app(100, false);
    app.start_camera(0).unwrap();
    assert!(app.tick().is_some());
    app.open_video_file(Path::new("clip")).unwrap();
    assert_eq!(app.source_kind(), Some(SourceKind::File));
    assert!(app.tick().is_some());
    app.start_camera(0).unwrap();
    assert_eq!(app.source_kind(), Some(SourceKind::Camera));

    assert_eq!(tracker.opened.load(Ordering::SeqCst), 3);
    assert_eq!(tracker.live.load(Ordering::SeqCst), 1);
    assert!(!tracker.overlapped.load(Ordering::SeqCst));

    app.close();
    assert_eq!(tracker.live.load(Ordering::SeqCst), 0);
    assert!(!app.is_running());
}

#[test]
fn test_end_of_file_notifies_once() {
    let (mut app, tracker) = fake_app(3, false);
    app.open_video_file(Path::new("clip")).unwrap();
    let mut frames = 0;
    let mut events = Vec::new();
    for _ in 0..10 {
        if app.tick().is_some() {
            frames += 1;
        }
        events.extend(app.take_events());
    }
    assert_eq!(frames, 3);
    assert_eq!(
        events,
        vec![AppEvent::SourceExhausted {
            kind: SourceKind::File
        }]
    );
    assert!(!app.is_running());
    assert_eq!(tracker.live.load(Ordering::SeqCst), 0);
    assert_eq!(app.status(), "playback finished");
}

#[test]
fn test_camera_read_failure_is_transient() {
    let (mut app, _tracker) = fake_app(0, true);
    app.start_camera(0).unwrap();
    let produced = (0..6).filter(|_| app.tick().is_some()).count();
    assert_eq!(produced, 3);
    assert!(app.take_events().is_empty());
    assert!(app.is_running());
}

#[test]
fn test_failed_open_leaves_source_unset() {
    let (mut app, tracker) = fake_app(5, false);
    app.start_camera(0).unwrap();
    assert!(app.open_video_file(Path::new("missing.avi")).is_err());
    assert!(!app.is_running());
    assert_eq!(tracker.live.load(Ordering::SeqCst), 0);
    assert!(app.status().contains("missing.avi"));
}

#[test]
fn test_bad_template_keeps_previous() {
    let (mut app, _tracker) = fake_app(5, false);
    let template = common::textured_template(120, 90, 8);
    let count = app.set_template_image(&DynamicImage::ImageLuma8(template));
    assert!(count > 0);

    let dir = TempDir::new().unwrap();
    let bogus = dir.path().join("template.png");
    std::fs::write(&bogus, b"not an image").unwrap();
    assert!(app.load_template(&bogus).is_err());
    assert_eq!(app.template().map(|t| t.features.len()), Some(count));
}

#[test]
fn test_load_template_downscales_wide_images() {
    let (mut app, _tracker) = fake_app(5, false);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wide.png");
    common::textured_template(1000, 300, 1).save(&path).unwrap();
    app.load_template(&path).unwrap();
    let template = app.template().unwrap();
    assert_eq!((template.width(), template.height()), (500, 150));
}

#[test]
fn test_screenshots_never_overwrite() {
    let (mut app, _tracker) = fake_app(5, false);
    let dir = TempDir::new().unwrap();
    assert!(app.save_screenshot(dir.path(), "shot").unwrap().is_none());

    app.open_video_file(Path::new("clip")).unwrap();
    app.tick().unwrap();
    let display = app.display_frame().unwrap();
    assert_eq!(display.dimensions(), (800, 600));

    let first = app.save_screenshot(dir.path(), "shot").unwrap().unwrap();
    let second = app.save_screenshot(dir.path(), "shot").unwrap().unwrap();
    let third = app.save_screenshot(dir.path(), "shot").unwrap().unwrap();
    assert_eq!(first.file_name().unwrap(), "shot.png");
    assert_eq!(second.file_name().unwrap(), "shot_1.png");
    assert_eq!(third.file_name().unwrap(), "shot_2.png");
}

#[test]
fn test_session_report_counts_frames() {
    let (mut app, _tracker) = fake_app(4, false);
    app.open_video_file(Path::new("clip")).unwrap();
    while app.is_running() {
        app.tick();
    }
    let report = app.session_report();
    assert_eq!(report.frames, 4);
    assert_eq!(report.frames_found, 0);
    assert_eq!(report.source, "fake file");
    assert_eq!(report.timestamp.len(), 15);
}
