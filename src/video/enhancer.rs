// src/video/enhancer.rs - Frame-by-frame resolution enhancement

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EnhanceConfig;
use crate::error::{PipelineError, Result};
use crate::video::backend::{FrameRead, VideoBackend};
use crate::video::ffmpeg_cli::FfmpegCliBackend;
use crate::video::types::{FrameRate, ResizeFilter, SinkParams, StreamInfo, TARGET_HEIGHT, TARGET_WIDTH};

/// Appended to the input file name to form the output name
pub const OUTPUT_SUFFIX: &str = "_enhanced";

/// Container extension of every enhanced file
pub const OUTPUT_EXTENSION: &str = "avi";

/// Why the frame loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    /// The source had no further frame: end of stream or a read failure
    SourceExhausted,

    /// The sink refused a frame; everything before it was kept
    SinkRejected,
}

/// Result of one enhancement run
#[derive(Debug, Clone)]
pub struct EnhancedVideo {
    /// Where the output container was written
    pub path: PathBuf,

    /// Frames appended to the output, equal to frames read before the loop ended
    pub frames_written: u64,

    /// Output frame rate, identical to the source's
    pub frame_rate: FrameRate,

    /// What the source reported when it was opened
    pub source: StreamInfo,

    pub loop_end: LoopEnd,
}

impl EnhancedVideo {
    /// Base name of the output file
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

/// Output location for `input` inside `output_dir`: `<input file name>_enhanced.avi`
///
/// Returns `None` when `input` has no file name component.
pub fn output_path_for(input: &Path, output_dir: &Path) -> Option<PathBuf> {
    let mut name = input.file_name()?.to_os_string();
    name.push(OUTPUT_SUFFIX);
    name.push(".");
    name.push(OUTPUT_EXTENSION);
    Some(output_dir.join(name))
}

/// Stretches every frame of a video to 2560x1440
///
/// The pipeline is synchronous and holds no mutable state, so one `Enhancer`
/// can serve concurrent calls as long as their output paths differ.
#[derive(Clone)]
pub struct Enhancer {
    backend: Arc<dyn VideoBackend>,
    filter: ResizeFilter,
}

impl Enhancer {
    pub fn new(backend: Arc<dyn VideoBackend>) -> Self {
        Self {
            backend,
            filter: ResizeFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: ResizeFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Pick the backend and filter named by `config`
    pub fn from_config(config: &EnhanceConfig) -> Result<Self> {
        let backend: Arc<dyn VideoBackend> = if config.native {
            native_backend()?
        } else {
            let backend = FfmpegCliBackend::from_config(config);
            if !backend.check_available() {
                warn!("{} or {} could not be launched; enhancement requests will fail",
                      config.ffmpeg_program, config.ffprobe_program);
            }
            Arc::new(backend)
        };

        Ok(Self::new(backend).with_filter(config.filter))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run the pipeline on `input`, writing into the existing directory `output_dir`
    ///
    /// Both handles are released on every path. A failed read or write ends
    /// the loop early and keeps the partial output; only opening the source
    /// or the sink is an error.
    pub fn enhance<P, Q>(&self, input: P, output_dir: Q) -> std::result::Result<EnhancedVideo, PipelineError>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let input = input.as_ref();
        let output_dir = output_dir.as_ref();

        let mut source = self.backend.open_source(input).map_err(|e| {
            warn!("Could not open {}: {}", input.display(), e);
            PipelineError::SourceOpen {
                path: input.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let info = source.info();
        info!("Enhancing {} ({}x{} @ {} fps) with {}",
              input.display(), info.width, info.height, info.frame_rate, self.backend.name());

        let output_path = output_path_for(input, output_dir).ok_or_else(|| PipelineError::SourceOpen {
            path: input.display().to_string(),
            reason: "input path has no file name".to_string(),
        })?;

        let params = SinkParams::target(info.frame_rate);
        let mut sink = self.backend.open_sink(&output_path, params).map_err(|e| {
            warn!("Could not create {}: {}", output_path.display(), e);
            PipelineError::SinkOpen {
                path: output_path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut frames_written: u64 = 0;
        let loop_end = loop {
            let frame = match source.read_frame() {
                FrameRead::Frame(frame) => frame,
                FrameRead::Exhausted => break LoopEnd::SourceExhausted,
            };

            let resized = frame.resized(TARGET_WIDTH, TARGET_HEIGHT, self.filter);
            if let Err(e) = sink.write_frame(&resized) {
                warn!("Output rejected frame {}: {}", frames_written, e);
                break LoopEnd::SinkRejected;
            }

            frames_written += 1;
            if frames_written % 100 == 0 {
                debug!("Enhanced {} frames of {}", frames_written, input.display());
            }
        };

        drop(source);
        if let Err(e) = sink.finish() {
            warn!("Finalizing {} failed: {}", output_path.display(), e);
        }

        info!("Wrote {} frames to {} ({:?})", frames_written, output_path.display(), loop_end);

        Ok(EnhancedVideo {
            path: output_path,
            frames_written,
            frame_rate: info.frame_rate,
            source: info,
            loop_end,
        })
    }
}

#[cfg(feature = "ffmpeg")]
fn native_backend() -> Result<Arc<dyn VideoBackend>> {
    let backend = crate::video::ffmpeg_native::FfmpegNativeBackend::new()?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "ffmpeg"))]
fn native_backend() -> Result<Arc<dyn VideoBackend>> {
    Err(crate::error::EnhancerError::generic(
        "the native backend needs the `ffmpeg` feature",
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::video::backend::{FrameSink, FrameSource};
    use crate::video::types::Frame;
    use std::fs::{File, OpenOptions};
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// What the in-memory backend observed
    #[derive(Debug, Default)]
    pub(crate) struct Recording {
        pub sink_params: Vec<SinkParams>,
        pub written: Vec<(u32, u32)>,
        pub colors: Vec<[u8; 3]>,
        pub finished: bool,
        pub sources_released: usize,
        pub sinks_released: usize,
    }

    /// Scripted source frames; `None` is a read failure
    #[derive(Clone)]
    pub(crate) struct MemoryBackend {
        pub reads: Vec<Option<(u32, u32)>>,
        pub frame_rate: FrameRate,
        pub source_size: (u32, u32),
        pub reject_after: Option<usize>,
        pub recording: Arc<Mutex<Recording>>,
    }

    impl MemoryBackend {
        pub fn with_frames(count: usize, size: (u32, u32)) -> Self {
            Self {
                reads: vec![Some(size); count],
                frame_rate: FrameRate::new(30000, 1001).unwrap(),
                source_size: size,
                reject_after: None,
                recording: Arc::new(Mutex::new(Recording::default())),
            }
        }
    }

    /// Flat colour of the `index`th scripted read
    fn shade(index: usize) -> [u8; 3] {
        let step = (index % 25) as u8 * 10;
        [step, 250 - step, 60]
    }

    struct MemorySource {
        info: StreamInfo,
        reads: std::iter::Enumerate<std::vec::IntoIter<Option<(u32, u32)>>>,
        recording: Arc<Mutex<Recording>>,
    }

    impl FrameSource for MemorySource {
        fn info(&self) -> StreamInfo {
            self.info
        }

        fn read_frame(&mut self) -> FrameRead {
            match self.reads.next() {
                Some((index, Some((w, h)))) => FrameRead::Frame(Frame::new_filled(w, h, shade(index))),
                _ => FrameRead::Exhausted,
            }
        }
    }

    impl Drop for MemorySource {
        fn drop(&mut self) {
            self.recording.lock().unwrap().sources_released += 1;
        }
    }

    struct MemorySink {
        file: File,
        written: usize,
        reject_after: Option<usize>,
        recording: Arc<Mutex<Recording>>,
    }

    impl FrameSink for MemorySink {
        fn write_frame(&mut self, frame: &Frame) -> std::result::Result<(), BackendError> {
            if self.reject_after == Some(self.written) {
                return Err(BackendError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "disk full",
                )));
            }
            // One line per frame keeps partial output visible on disk
            writeln!(self.file, "{}x{}", frame.width(), frame.height())?;
            self.written += 1;
            let mut recording = self.recording.lock().unwrap();
            recording.written.push(frame.dimensions());
            recording.colors.push(frame.get_pixel(0, 0));
            Ok(())
        }

        fn finish(self: Box<Self>) -> std::result::Result<(), BackendError> {
            self.recording.lock().unwrap().finished = true;
            Ok(())
        }
    }

    impl Drop for MemorySink {
        fn drop(&mut self) {
            self.recording.lock().unwrap().sinks_released += 1;
        }
    }

    impl VideoBackend for MemoryBackend {
        fn name(&self) -> &str {
            "memory"
        }

        fn open_source(&self, path: &Path) -> std::result::Result<Box<dyn FrameSource>, BackendError> {
            std::fs::metadata(path)?;
            Ok(Box::new(MemorySource {
                info: StreamInfo {
                    width: self.source_size.0,
                    height: self.source_size.1,
                    frame_rate: self.frame_rate,
                },
                reads: self.reads.clone().into_iter().enumerate(),
                recording: Arc::clone(&self.recording),
            }))
        }

        fn open_sink(&self, path: &Path, params: SinkParams) -> std::result::Result<Box<dyn FrameSink>, BackendError> {
            let file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
            self.recording.lock().unwrap().sink_params.push(params);
            Ok(Box::new(MemorySink {
                file,
                written: 0,
                reject_after: self.reject_after,
                recording: Arc::clone(&self.recording),
            }))
        }
    }

    fn input_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"not really a video").unwrap();
        path
    }

    fn output_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_every_frame_reaches_target_resolution() {
        let dir = tempdir().unwrap();
        let input = input_file(dir.path(), "clip.mp4");
        let backend = MemoryBackend::with_frames(3, (32, 24));
        let recording = Arc::clone(&backend.recording);

        let enhancer = Enhancer::new(Arc::new(backend));
        let result = enhancer.enhance(&input, dir.path()).unwrap();

        assert_eq!(result.frames_written, 3);
        assert_eq!(result.loop_end, LoopEnd::SourceExhausted);
        assert_eq!(result.frame_rate, FrameRate { num: 30000, den: 1001 });

        let recording = recording.lock().unwrap();
        assert_eq!(recording.written, vec![(TARGET_WIDTH, TARGET_HEIGHT); 3]);
        assert_eq!(recording.sink_params, vec![SinkParams::target(FrameRate { num: 30000, den: 1001 })]);
        assert!(recording.finished);
        assert_eq!(recording.sources_released, 1);
        assert_eq!(recording.sinks_released, 1);
    }

    #[test]
    fn test_frames_are_written_in_source_order() {
        let dir = tempdir().unwrap();
        let input = input_file(dir.path(), "ordered.mp4");
        let backend = MemoryBackend::with_frames(6, (8, 6));
        let recording = Arc::clone(&backend.recording);

        let result = Enhancer::new(Arc::new(backend))
            .with_filter(ResizeFilter::Nearest)
            .enhance(&input, dir.path())
            .unwrap();

        assert_eq!(result.frames_written, 6);
        let expected: Vec<[u8; 3]> = (0..6).map(shade).collect();
        assert_eq!(recording.lock().unwrap().colors, expected);
    }

    #[test]
    fn test_stretch_does_not_preserve_aspect_ratio() {
        let dir = tempdir().unwrap();
        let input = input_file(dir.path(), "mixed.mov");
        let mut backend = MemoryBackend::with_frames(0, (640, 480));
        backend.reads = vec![Some((640, 480)), Some((1920, 1080))];
        let recording = Arc::clone(&backend.recording);

        let result = Enhancer::new(Arc::new(backend)).enhance(&input, dir.path()).unwrap();

        assert_eq!(result.frames_written, 2);
        assert_eq!(recording.lock().unwrap().written, vec![(2560, 1440), (2560, 1440)]);
    }

    #[test]
    fn test_zero_frame_input_produces_empty_output() {
        let dir = tempdir().unwrap();
        let input = input_file(dir.path(), "empty.avi");
        let backend = MemoryBackend::with_frames(0, (320, 240));

        let result = Enhancer::new(Arc::new(backend)).enhance(&input, dir.path()).unwrap();

        assert_eq!(result.frames_written, 0);
        assert!(result.path.exists());
        assert!(output_lines(&result.path).is_empty());
    }

    #[test]
    fn test_missing_input_creates_no_output() {
        let input_dir = tempdir().unwrap();
        let output_dir = tempdir().unwrap();
        let backend = MemoryBackend::with_frames(2, (320, 240));
        let recording = Arc::clone(&backend.recording);

        let err = Enhancer::new(Arc::new(backend))
            .enhance(input_dir.path().join("ghost.mp4"), output_dir.path())
            .unwrap_err();

        assert!(matches!(err, PipelineError::SourceOpen { .. }));
        assert_eq!(err.user_message(), "Error opening video file.");
        assert_eq!(std::fs::read_dir(output_dir.path()).unwrap().count(), 0);
        assert!(recording.lock().unwrap().sink_params.is_empty());
    }

    #[test]
    fn test_unwritable_output_dir_fails_before_any_write() {
        let dir = tempdir().unwrap();
        let input = input_file(dir.path(), "clip.mp4");
        let backend = MemoryBackend::with_frames(2, (320, 240));
        let recording = Arc::clone(&backend.recording);

        let err = Enhancer::new(Arc::new(backend))
            .enhance(&input, dir.path().join("does-not-exist"))
            .unwrap_err();

        assert!(matches!(err, PipelineError::SinkOpen { .. }));
        let recording = recording.lock().unwrap();
        assert!(recording.written.is_empty());
        assert_eq!(recording.sources_released, 1);
    }

    #[test]
    fn test_output_path_is_deterministic_and_overwritten() {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("processed");
        std::fs::create_dir(&output_dir).unwrap();
        let input = input_file(dir.path(), "clip.mov");

        let first = Enhancer::new(Arc::new(MemoryBackend::with_frames(3, (16, 9))))
            .enhance(&input, &output_dir)
            .unwrap();
        let second = Enhancer::new(Arc::new(MemoryBackend::with_frames(1, (16, 9))))
            .enhance(&input, &output_dir)
            .unwrap();

        assert_eq!(first.path, second.path);
        assert_eq!(second.file_name(), Some("clip.mov_enhanced.avi"));
        assert_eq!(output_lines(&second.path).len(), 1);
    }

    #[test]
    fn test_read_failure_keeps_partial_output() {
        let dir = tempdir().unwrap();
        let input = input_file(dir.path(), "broken.mp4");
        let mut backend = MemoryBackend::with_frames(0, (16, 9));
        backend.reads = vec![Some((16, 9)), Some((16, 9)), None, Some((16, 9))];
        let recording = Arc::clone(&backend.recording);

        let result = Enhancer::new(Arc::new(backend)).enhance(&input, dir.path()).unwrap();

        assert_eq!(result.frames_written, 2);
        assert_eq!(result.loop_end, LoopEnd::SourceExhausted);
        assert_eq!(output_lines(&result.path), vec!["2560x1440", "2560x1440"]);

        let recording = recording.lock().unwrap();
        assert_eq!(recording.colors.len(), 2);
        assert_eq!(recording.sources_released, 1);
        assert_eq!(recording.sinks_released, 1);
    }

    #[test]
    fn test_sink_rejection_stops_loop() {
        let dir = tempdir().unwrap();
        let input = input_file(dir.path(), "long.mp4");
        let mut backend = MemoryBackend::with_frames(5, (16, 9));
        backend.reject_after = Some(2);
        let recording = Arc::clone(&backend.recording);

        let result = Enhancer::new(Arc::new(backend)).enhance(&input, dir.path()).unwrap();

        assert_eq!(result.frames_written, 2);
        assert_eq!(result.loop_end, LoopEnd::SinkRejected);
        assert_eq!(output_lines(&result.path).len(), 2);
        assert_eq!(recording.lock().unwrap().sinks_released, 1);
    }

    #[test]
    fn test_output_path_for() {
        assert_eq!(
            output_path_for(Path::new("uploads/clip.mov"), Path::new("processed")),
            Some(PathBuf::from("processed/clip.mov_enhanced.avi"))
        );
        assert_eq!(
            output_path_for(Path::new("/tmp/holiday.final.mp4"), Path::new("/out")),
            Some(PathBuf::from("/out/holiday.final.mp4_enhanced.avi"))
        );
        assert_eq!(output_path_for(Path::new("/"), Path::new("/out")), None);
    }
}
