pub mod app;
pub mod config;
pub mod error;
pub mod features;
pub mod io;
pub mod matching;
pub mod optimization;
pub mod processor;
pub mod pump;
pub mod source;
pub mod visualization;

pub use app::{AppContext, AppEvent};
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use processor::{Detection, FrameProcessor, FrameReport, Template};
pub use source::SourceKind;
