use thiserror::Error;

/// Main error type for the video enhancer
#[derive(Error, Debug)]
pub enum EnhancerError {
    #[error("Enhancement pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Video backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Video info extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Failures of the resolution-enhancement pipeline.
///
/// Only opening the two ends can fail. Anything that goes wrong once frames
/// are flowing ends the frame loop instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Error opening video file: {path} ({reason})")]
    SourceOpen { path: String, reason: String },

    #[error("Error creating output video: {path} ({reason})")]
    SinkOpen { path: String, reason: String },
}

/// Errors raised by a decode/encode backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to probe {path}: {reason}")]
    ProbeFailed { path: String, reason: String },

    #[error("No video stream in {path}")]
    NoVideoStream { path: String },

    #[error("Failed to launch {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("{program} exited with {status}: {stderr}")]
    ProcessFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Frame has wrong dimensions: expected {expected:?}, got {actual:?}")]
    FrameSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[cfg(feature = "ffmpeg")]
    #[error("libav error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),
}

/// Errors from the remote video info extractor
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to run {program}: {reason}")]
    LaunchFailed { program: String, reason: String },

    #[error("{stderr}")]
    ExtractionFailed { stderr: String },

    #[error("Could not parse extractor output: {reason}")]
    InvalidOutput { reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using EnhancerError
pub type Result<T> = std::result::Result<T, EnhancerError>;

impl EnhancerError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Pipeline(err) => err.user_message(),
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

impl PipelineError {
    /// Message shown to API clients; the path and backend detail stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::SourceOpen { .. } => "Error opening video file.".to_string(),
            Self::SinkOpen { .. } => "Error creating output video file.".to_string(),
        }
    }
}
