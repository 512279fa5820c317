use std::path::Path;

use crate::error::BackendError;
use crate::video::types::{Frame, SinkParams, StreamInfo};

/// Outcome of pulling one frame from a [`FrameSource`]
#[derive(Debug)]
pub enum FrameRead {
    /// The next frame, in source order
    Frame(Frame),

    /// No further frame. End of stream and a failed read are not told apart.
    Exhausted,
}

/// An open, readable video stream
///
/// Implementations release their underlying handle when dropped. Handles
/// are opened and used on a single thread, so they need not be `Send`.
pub trait FrameSource {
    /// Dimensions and frame rate of the stream
    fn info(&self) -> StreamInfo;

    /// Decode the next frame
    fn read_frame(&mut self) -> FrameRead;
}

/// An open, writable video container
///
/// Dropping a sink without calling [`FrameSink::finish`] still releases it;
/// whatever was written so far stays on disk.
pub trait FrameSink {
    /// Append one frame; it must match the dimensions the sink was opened with
    fn write_frame(&mut self, frame: &Frame) -> Result<(), BackendError>;

    /// Flush pending data and close the container
    fn finish(self: Box<Self>) -> Result<(), BackendError>;
}

/// Decode/encode capability the enhancement pipeline runs on
pub trait VideoBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Open `path` for reading
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, BackendError>;

    /// Create (or truncate) `path` for writing frames described by `params`
    fn open_sink(&self, path: &Path, params: SinkParams) -> Result<Box<dyn FrameSink>, BackendError>;
}

/// Reject frames whose size does not match what the sink was opened with
pub(crate) fn check_frame_size(frame: &Frame, params: &SinkParams) -> Result<(), BackendError> {
    let expected = (params.width, params.height);
    if frame.dimensions() != expected {
        return Err(BackendError::FrameSize {
            expected,
            actual: frame.dimensions(),
        });
    }
    Ok(())
}
