//! Application state: the loaded template, the single active frame source
//! and the last displayed frame.

use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage};

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::io::{SessionReport, load_image, next_screenshot_path, timestamp_string};
use crate::processor::{FrameProcessor, FrameReport, Template};
use crate::source::{FrameSource, SourceKind, SourceOpener, SystemOpener};
use crate::visualization::fit_to_viewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// The active source ran out of frames and playback was stopped.
    SourceExhausted { kind: SourceKind },
}

pub struct AppContext<O: SourceOpener = SystemOpener> {
    processor: FrameProcessor,
    opener: O,
    template: Option<Template>,
    source: Option<Box<dyn FrameSource>>,
    status: String,
    events: Vec<AppEvent>,
    display: Option<RgbImage>,
    session: SessionReport,
}

impl AppContext<SystemOpener> {
    pub fn new(config: TrackerConfig) -> AppContext<SystemOpener> {
        AppContext::with_opener(FrameProcessor::new(config), SystemOpener)
    }
}

impl<O: SourceOpener> AppContext<O> {
    pub fn with_opener(processor: FrameProcessor, opener: O) -> AppContext<O> {
        AppContext {
            processor,
            opener,
            template: None,
            source: None,
            status: String::from("idle"),
            events: Vec::new(),
            display: None,
            session: SessionReport::default(),
        }
    }

    pub fn processor(&self) -> &FrameProcessor {
        &self.processor
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }

    /// Decodes and installs a new template. On failure the previous template stays.
    pub fn load_template(&mut self, path: &Path) -> Result<usize> {
        let image = match load_image(path) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("{}", e);
                self.status = e.to_string();
                return Err(e);
            }
        };
        let count = self.set_template_image(&image);
        log::info!("template {} loaded: {} keypoints", path.display(), count);
        Ok(count)
    }

    pub fn set_template_image(&mut self, image: &DynamicImage) -> usize {
        let template = self.processor.build_template(image);
        let count = template.features.len();
        self.session.template_keypoints = count;
        self.status = format!("template loaded: {} keypoints", count);
        self.template = Some(template);
        count
    }

    /// Releases the active source, then opens `path` for playback.
    pub fn open_video_file(&mut self, path: &Path) -> Result<()> {
        self.stop();
        let source = self.opener.open_file(path);
        self.install(source)
    }

    /// Releases the active source, then opens camera `index`.
    pub fn start_camera(&mut self, index: usize) -> Result<()> {
        self.stop();
        let source = self.opener.open_camera(index);
        self.install(source)
    }

    fn install(&mut self, source: Result<Box<dyn FrameSource>>) -> Result<()> {
        match source {
            Ok(source) => {
                log::info!("{} source started: {}", source.kind(), source.describe());
                self.status = format!("playing {}", source.describe());
                self.session.source = source.describe();
                self.source = Some(source);
                Ok(())
            }
            Err(e) => {
                log::warn!("{}", e);
                self.status = e.to_string();
                Err(e)
            }
        }
    }

    /// Releases the active source, if any.
    pub fn stop(&mut self) {
        if let Some(source) = self.source.take() {
            log::info!("{} source stopped: {}", source.kind(), source.describe());
        }
    }

    /// Stops playback and forgets the template and the displayed frame.
    pub fn close(&mut self) {
        self.stop();
        self.template = None;
        self.display = None;
        self.status = String::from("idle");
    }

    pub fn is_running(&self) -> bool {
        self.source.is_some()
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.source.as_ref().map(|s| s.kind())
    }

    pub fn source_len_hint(&self) -> Option<usize> {
        self.source.as_ref().and_then(|s| s.len_hint())
    }

    /// Pulls and processes one frame from the active source.
    ///
    /// The end of a file source stops playback and queues a single
    /// [`AppEvent::SourceExhausted`]. A camera that fails to deliver a frame
    /// just yields nothing for this tick.
    pub fn tick(&mut self) -> Option<FrameReport> {
        let source = self.source.as_mut()?;
        let kind = source.kind();
        match source.read_frame() {
            Ok(Some(frame)) => {
                let report = self.processor.process(self.template.as_ref(), &frame);
                self.status = report.status();
                self.session.record(&report);
                let render = &self.processor.config().render;
                self.display = Some(fit_to_viewport(
                    &report.image,
                    render.viewport_width,
                    render.viewport_height,
                ));
                Some(report)
            }
            Ok(None) if kind == SourceKind::File => {
                self.stop();
                self.status = String::from("playback finished");
                self.events.push(AppEvent::SourceExhausted { kind });
                None
            }
            Ok(None) => {
                log::debug!("{} delivered no frame", kind);
                None
            }
            Err(e) => {
                log::warn!("{} read failed: {}", kind, e);
                None
            }
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Drains the queued events.
    pub fn take_events(&mut self) -> Vec<AppEvent> {
        std::mem::take(&mut self.events)
    }

    /// The last processed frame as fitted to the viewport.
    pub fn display_frame(&self) -> Option<&RgbImage> {
        self.display.as_ref()
    }

    /// Writes the displayed frame to the first free `<stem>[_N].png` in `dir`.
    pub fn save_screenshot(&self, dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
        let Some(display) = &self.display else {
            return Ok(None);
        };
        let path = next_screenshot_path(dir, stem, "png");
        display.save(&path)?;
        log::info!("screenshot saved to {}", path.display());
        Ok(Some(path))
    }

    pub fn session_report(&self) -> SessionReport {
        SessionReport {
            timestamp: timestamp_string(),
            ..self.session.clone()
        }
    }
}
