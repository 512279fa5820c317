//! # Video-Enhancer
//!
//! A small web backend that stretches uploaded videos to 2K, looks up direct
//! links for remote videos, and serves the processed files back.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use video_enhancer::video::{Enhancer, FfmpegCliBackend};
//!
//! # fn main() -> anyhow::Result<()> {
//! let enhancer = Enhancer::new(Arc::new(FfmpegCliBackend::default()));
//! let output = enhancer.enhance("uploads/clip.mov", "processed")?;
//!
//! // processed/clip.mov_enhanced.avi, every frame 2560x1440
//! println!("{} frames -> {}", output.frames_written, output.path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`video`] - Decode/encode backends and the enhancement pipeline
//! - [`extract`] - Remote video info lookup through yt-dlp
//! - [`server`] - HTTP endpoints
//! - [`config`] - Configuration management
//!
//! ## Custom backends
//!
//! The pipeline only talks to the [`VideoBackend`](video::VideoBackend) trait,
//! so any decoder can be plugged in:
//!
//! ```rust,no_run
//! use std::path::Path;
//! use video_enhancer::error::BackendError;
//! use video_enhancer::video::{FrameSink, FrameSource, SinkParams, VideoBackend};
//!
//! struct MyBackend;
//!
//! impl VideoBackend for MyBackend {
//!     fn name(&self) -> &str {
//!         "mine"
//!     }
//!
//!     fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, BackendError> {
//!         todo!("open {}", path.display())
//!     }
//!
//!     fn open_sink(&self, path: &Path, params: SinkParams) -> Result<Box<dyn FrameSink>, BackendError> {
//!         todo!("create {} at {}x{}", path.display(), params.width, params.height)
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod server;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    error::{EnhancerError, PipelineError, Result},
    video::{EnhancedVideo, Enhancer},
};
