//! Fixed-interval scheduling of [`AppContext::tick`], either on the calling
//! thread or on a worker that owns the context and streams frames back.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use image::RgbImage;

use crate::app::{AppContext, AppEvent};
use crate::config::PumpConfig;
use crate::error::{Result, TrackerError};
use crate::source::SourceOpener;

/// Where displayed frames go.
pub trait FrameSink {
    fn present(&mut self, index: usize, frame: &RgbImage, status: &str) -> Result<()>;

    fn event(&mut self, _event: &AppEvent) -> Result<()> {
        Ok(())
    }
}

/// Writes every displayed frame as `frame_NNNNNN.png`.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: &Path) -> Result<DirectorySink> {
        std::fs::create_dir_all(dir)?;
        Ok(DirectorySink {
            dir: dir.to_path_buf(),
        })
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", index))
    }
}

impl FrameSink for DirectorySink {
    fn present(&mut self, index: usize, frame: &RgbImage, _status: &str) -> Result<()> {
        frame.save(self.frame_path(index))?;
        Ok(())
    }
}

/// Streams frames and status text to a rerun recording.
#[cfg(feature = "viewer")]
pub struct RerunSink {
    recording: rerun::RecordingStream,
}

#[cfg(feature = "viewer")]
impl RerunSink {
    const TOPIC: &'static str = "/tracker";

    pub fn save(path: &Path) -> Result<RerunSink> {
        let recording = rerun::RecordingStreamBuilder::new("planar-tracker")
            .save(path)
            .map_err(|e| TrackerError::Viewer(e.to_string()))?;
        Ok(RerunSink { recording })
    }

    pub fn spawn() -> Result<RerunSink> {
        let recording = rerun::RecordingStreamBuilder::new("planar-tracker")
            .spawn()
            .map_err(|e| TrackerError::Viewer(e.to_string()))?;
        Ok(RerunSink { recording })
    }
}

#[cfg(feature = "viewer")]
impl FrameSink for RerunSink {
    fn present(&mut self, index: usize, frame: &RgbImage, status: &str) -> Result<()> {
        self.recording
            .set_time("frame", rerun::TimeCell::from_sequence(index as i64));
        crate::visualization::log_image_as_compressed(
            &self.recording,
            Self::TOPIC,
            frame,
            image::ImageFormat::Png,
        )?;
        self.recording
            .log(
                format!("{}/status", Self::TOPIC),
                &rerun::TextLog::new(status),
            )
            .map_err(|e| TrackerError::Viewer(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PumpSummary {
    pub frames: usize,
    pub events: Vec<AppEvent>,
}

/// Message from a pump worker thread.
#[derive(Debug, Clone)]
pub enum PumpMessage {
    Frame {
        index: usize,
        image: RgbImage,
        status: String,
    },
    Event(AppEvent),
}

#[derive(Debug, Clone)]
pub struct FramePump {
    tick: Duration,
    max_frames: Option<usize>,
}

impl FramePump {
    pub fn new(config: &PumpConfig) -> FramePump {
        FramePump {
            tick: Duration::from_millis(config.tick_ms),
            max_frames: None,
        }
    }

    /// Stop the source after this many presented frames.
    pub fn with_max_frames(mut self, max_frames: Option<usize>) -> FramePump {
        self.max_frames = max_frames;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick
    }

    /// Ticks `app` until its source stops.
    pub fn run<O: SourceOpener>(
        &self,
        app: &mut AppContext<O>,
        sink: &mut dyn FrameSink,
    ) -> Result<PumpSummary> {
        self.run_until(app, sink, &AtomicBool::new(false))
    }

    /// Like [`FramePump::run`] but also returns once `stop` is raised.
    pub fn run_until<O: SourceOpener>(
        &self,
        app: &mut AppContext<O>,
        sink: &mut dyn FrameSink,
        stop: &AtomicBool,
    ) -> Result<PumpSummary> {
        let mut summary = PumpSummary::default();
        while app.is_running() && !stop.load(Ordering::SeqCst) {
            if let Some(report) = app.tick() {
                let frame = app.display_frame().unwrap_or(&report.image);
                sink.present(summary.frames, frame, app.status())?;
                summary.frames += 1;
            }
            for event in app.take_events() {
                log::info!("{:?}", event);
                sink.event(&event)?;
                summary.events.push(event);
            }
            if self.max_frames.is_some_and(|max| summary.frames >= max) {
                app.stop();
                break;
            }
            if app.is_running() {
                std::thread::sleep(self.tick);
            }
        }
        log::debug!("pump finished after {} frames", summary.frames);
        Ok(summary)
    }

    /// Runs the pump on a worker thread. The context is built on that thread
    /// by `factory`, so sources never cross threads.
    pub fn spawn<O, F>(self, factory: F) -> PumpHandle
    where
        O: SourceOpener + 'static,
        F: FnOnce() -> Result<AppContext<O>> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();
        let thread = std::thread::spawn(move || {
            let mut app = factory()?;
            let mut sink = ChannelSink {
                sender,
                stop: worker_stop.clone(),
            };
            self.run_until(&mut app, &mut sink, &worker_stop)
        });
        PumpHandle {
            receiver,
            stop,
            thread,
        }
    }
}

struct ChannelSink {
    sender: Sender<PumpMessage>,
    stop: Arc<AtomicBool>,
}

impl ChannelSink {
    fn send(&self, message: PumpMessage) {
        if self.sender.send(message).is_err() {
            log::debug!("pump receiver dropped, stopping worker");
            self.stop.store(true, Ordering::SeqCst);
        }
    }
}

impl FrameSink for ChannelSink {
    fn present(&mut self, index: usize, frame: &RgbImage, status: &str) -> Result<()> {
        self.send(PumpMessage::Frame {
            index,
            image: frame.clone(),
            status: status.to_string(),
        });
        Ok(())
    }

    fn event(&mut self, event: &AppEvent) -> Result<()> {
        self.send(PumpMessage::Event(*event));
        Ok(())
    }
}

pub struct PumpHandle {
    receiver: Receiver<PumpMessage>,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<Result<PumpSummary>>,
}

impl PumpHandle {
    pub fn receiver(&self) -> &Receiver<PumpMessage> {
        &self.receiver
    }

    /// Asks the worker to finish after its current tick.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Drops the receiver, which also stops a worker that is still running,
    /// and waits for the thread.
    pub fn join(self) -> Result<PumpSummary> {
        let PumpHandle {
            receiver, thread, ..
        } = self;
        drop(receiver);
        thread
            .join()
            .map_err(|_| TrackerError::Worker("pump thread panicked".to_string()))?
    }
}
