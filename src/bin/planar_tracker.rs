use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use image::RgbImage;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;

use planar_tracker::app::{AppContext, AppEvent};
use planar_tracker::config::TrackerConfig;
use planar_tracker::io::{load_config, load_image, save_config, write_session_report};
use planar_tracker::processor::FrameProcessor;
use planar_tracker::pump::{DirectorySink, FramePump, FrameSink};
use planar_tracker::visualization::{draw_keypoints, fit_to_viewport};

#[derive(Parser)]
#[command(version, about, author)]
struct PtrkCli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a template through a video file or a camera stream
    Track {
        /// Reference image of the planar object
        #[arg(short, long)]
        template: PathBuf,

        /// Video file (mp4/avi/mkv/mov), image-sequence directory or animated gif
        #[arg(long, conflicts_with = "camera", required_unless_present = "camera")]
        video: Option<PathBuf>,

        /// Camera device index
        #[arg(long)]
        camera: Option<usize>,

        /// Write every displayed frame and a session report here
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Tracker configuration JSON
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stream frames to a spawned rerun viewer
        #[arg(long)]
        viewer: bool,

        /// Save a rerun recording to this file
        #[arg(long)]
        rrd: Option<PathBuf>,

        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<usize>,
    },
    /// Process one frame and write the annotated result
    Match {
        #[arg(short, long)]
        template: PathBuf,

        #[arg(short, long)]
        frame: PathBuf,

        #[arg(short, long)]
        out: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print keypoint counts of images
    Features {
        images: Vec<PathBuf>,

        /// Directory for images with keypoints drawn
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write the default configuration
    Config {
        #[arg(short, long)]
        out: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = PtrkCli::parse();
    match cli.command {
        Commands::Track {
            template,
            video,
            camera,
            out,
            config,
            viewer,
            rrd,
            max_frames,
        } => {
            let config = read_config(config.as_deref())?;
            let mut sinks: Vec<Box<dyn FrameSink>> = Vec::new();
            if let Some(out) = &out {
                sinks.push(Box::new(DirectorySink::new(out)?));
            }
            if viewer || rrd.is_some() {
                sinks.push(viewer_sink(viewer, rrd.as_deref())?);
            }
            track(
                config,
                &template,
                video.as_deref(),
                camera,
                out.as_deref(),
                sinks,
                max_frames,
            )
        }
        Commands::Match {
            template,
            frame,
            out,
            config,
        } => {
            let config = read_config(config.as_deref())?;
            match_one(config, &template, &frame, &out)
        }
        Commands::Features {
            images,
            out,
            config,
        } => {
            let config = read_config(config.as_deref())?;
            count_features(config, &images, out.as_deref())
        }
        Commands::Config { out } => {
            save_config(&out, &TrackerConfig::default())
                .with_context(|| format!("writing {}", out.display()))?;
            println!("default configuration written to {}", out.display());
            Ok(())
        }
    }
}

fn read_config(path: Option<&Path>) -> anyhow::Result<TrackerConfig> {
    match path {
        Some(path) => load_config(path).with_context(|| format!("reading {}", path.display())),
        None => Ok(TrackerConfig::default()),
    }
}

#[cfg(feature = "viewer")]
fn viewer_sink(spawn: bool, rrd: Option<&Path>) -> anyhow::Result<Box<dyn FrameSink>> {
    use planar_tracker::pump::RerunSink;
    let sink = match rrd {
        Some(path) if !spawn => RerunSink::save(path)?,
        _ => RerunSink::spawn()?,
    };
    Ok(Box::new(sink))
}

#[cfg(not(feature = "viewer"))]
fn viewer_sink(_spawn: bool, _rrd: Option<&Path>) -> anyhow::Result<Box<dyn FrameSink>> {
    bail!("ptrk was built without the `viewer` feature")
}

/// Fans frames out to every configured sink, prints status changes and
/// advances the progress bar.
struct ConsoleSink {
    sinks: Vec<Box<dyn FrameSink>>,
    progress: ProgressBar,
    last_status: String,
}

impl FrameSink for ConsoleSink {
    fn present(
        &mut self,
        index: usize,
        frame: &RgbImage,
        status: &str,
    ) -> planar_tracker::Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.present(index, frame, status)?;
        }
        if status != self.last_status {
            self.progress.println(format!("[{:>6}] {}", index, status));
            self.last_status = status.to_string();
        }
        self.progress.inc(1);
        Ok(())
    }

    fn event(&mut self, event: &AppEvent) -> planar_tracker::Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.event(event)?;
        }
        match event {
            AppEvent::SourceExhausted { kind } => {
                self.progress.println(format!("{} source finished", kind))
            }
        }
        Ok(())
    }
}

fn track(
    config: TrackerConfig,
    template: &Path,
    video: Option<&Path>,
    camera: Option<usize>,
    out: Option<&Path>,
    sinks: Vec<Box<dyn FrameSink>>,
    max_frames: Option<usize>,
) -> anyhow::Result<()> {
    let pump = FramePump::new(&config.pump).with_max_frames(max_frames);
    let mut app = AppContext::new(config);
    let keypoints = app
        .load_template(template)
        .with_context(|| format!("loading template {}", template.display()))?;
    println!("template: {} keypoints", keypoints);

    match (video, camera) {
        (Some(video), _) => app
            .open_video_file(video)
            .with_context(|| format!("opening {}", video.display()))?,
        (None, Some(index)) => app.start_camera(index)?,
        (None, None) => bail!("either --video or --camera is required"),
    }

    let progress = match app.source_len_hint() {
        Some(len) => ProgressBar::new(max_frames.map_or(len, |m| m.min(len)) as u64),
        None => ProgressBar::new_spinner(),
    };
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let mut sink = ConsoleSink {
        sinks,
        progress,
        last_status: String::new(),
    };

    let now = Instant::now();
    let summary = pump.run(&mut app, &mut sink)?;
    sink.progress.finish_and_clear();
    let duration_sec = now.elapsed().as_secs_f64();
    println!(
        "{} frames in {:.3} sec, last status: {}",
        summary.frames,
        duration_sec,
        app.status()
    );

    if let Some(out) = out {
        let path = out.join("session.json");
        write_session_report(&path, &app.session_report())?;
        if let Some(shot) = app.save_screenshot(out, "screenshot")? {
            println!("last frame saved to {}", shot.display());
        }
    }
    app.close();
    Ok(())
}

fn match_one(
    config: TrackerConfig,
    template: &Path,
    frame: &Path,
    out: &Path,
) -> anyhow::Result<()> {
    let viewport = (config.render.viewport_width, config.render.viewport_height);
    let processor = FrameProcessor::new(config);
    let template_img =
        load_image(template).with_context(|| format!("loading {}", template.display()))?;
    let template = processor.build_template(&template_img);
    let frame = load_image(frame)
        .with_context(|| format!("loading {}", frame.display()))?
        .to_rgb8();

    let now = Instant::now();
    let report = processor.process(Some(&template), &frame);
    log::debug!("processing took {:.6} sec", now.elapsed().as_secs_f64());
    println!("{}", report.status());

    let display = fit_to_viewport(&report.image, viewport.0, viewport.1);
    display
        .save(out)
        .with_context(|| format!("writing {}", out.display()))?;
    Ok(())
}

fn count_features(
    config: TrackerConfig,
    images: &[PathBuf],
    out: Option<&Path>,
) -> anyhow::Result<()> {
    if images.is_empty() {
        bail!("no images given");
    }
    if let Some(out) = out {
        std::fs::create_dir_all(out)?;
    }
    let processor = FrameProcessor::new(config);
    let counts: Vec<anyhow::Result<(PathBuf, usize)>> = images
        .par_iter()
        .progress_count(images.len() as u64)
        .map(|path| {
            let img = load_image(path)?.to_rgb8();
            let gray = image::imageops::grayscale(&img);
            let features = processor.extractor().detect_and_compute(&gray);
            if let Some(out) = out {
                let mut canvas = img;
                draw_keypoints(&mut canvas, &features.keypoints);
                let name = path.file_name().context("image path without file name")?;
                canvas.save(out.join(name).with_extension("png"))?;
            }
            Ok((path.clone(), features.len()))
        })
        .collect();
    for result in counts {
        let (path, count) = result?;
        println!("{}: {} keypoints", path.display(), count);
    }
    Ok(())
}
