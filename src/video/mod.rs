//! # Video Processing Module
//!
//! Frame decoding/encoding backends and the resolution-enhancement pipeline.

pub mod backend;
pub mod enhancer;
pub mod types;

// Drives the ffmpeg/ffprobe executables (no libav linking)
mod ffmpeg_cli;
#[cfg(feature = "ffmpeg")]
mod ffmpeg_native;

pub use backend::{FrameRead, FrameSink, FrameSource, VideoBackend};
pub use enhancer::{output_path_for, EnhancedVideo, Enhancer, LoopEnd, OUTPUT_EXTENSION, OUTPUT_SUFFIX};
pub use ffmpeg_cli::FfmpegCliBackend;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg_native::FfmpegNativeBackend;
pub use types::{Frame, FrameRate, ResizeFilter, SinkParams, StreamInfo, TARGET_HEIGHT, TARGET_WIDTH};
