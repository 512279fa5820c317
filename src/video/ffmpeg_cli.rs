// src/video/ffmpeg_cli.rs - Backend driving the ffmpeg/ffprobe executables

use std::ffi::OsString;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::EnhanceConfig;
use crate::error::BackendError;
use crate::video::backend::{check_frame_size, FrameRead, FrameSink, FrameSource, VideoBackend};
use crate::video::types::{Frame, FrameRate, SinkParams, StreamInfo};

/// Decodes and encodes by piping raw RGB24 frames through ffmpeg child processes
#[derive(Debug, Clone)]
pub struct FfmpegCliBackend {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegCliBackend {
    pub fn new<S: Into<String>>(ffmpeg: S, ffprobe: S) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(config: &EnhanceConfig) -> Self {
        Self::new(config.ffmpeg_program.as_str(), config.ffprobe_program.as_str())
    }

    /// Whether both executables can be launched
    pub fn check_available(&self) -> bool {
        [&self.ffmpeg, &self.ffprobe].iter().all(|program| {
            Command::new(program)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false)
        })
    }

    fn probe(&self, path: &Path) -> Result<StreamInfo, BackendError> {
        let output = Command::new(&self.ffprobe)
            .args(probe_args(path))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| BackendError::SpawnFailed {
                program: self.ffprobe.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(BackendError::ProcessFailed {
                program: self.ffprobe.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_probe_output(&output.stdout, path)
    }
}

impl Default for FfmpegCliBackend {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl VideoBackend for FfmpegCliBackend {
    fn name(&self) -> &str {
        "ffmpeg-cli"
    }

    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, BackendError> {
        // ffprobe's complaint about a missing file is far less readable
        std::fs::metadata(path)?;

        let info = self.probe(path)?;
        debug!("Probed {}: {}x{} @ {} fps", path.display(), info.width, info.height, info.frame_rate);

        let mut child = Command::new(&self.ffmpeg)
            .args(decode_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BackendError::SpawnFailed {
                program: self.ffmpeg.clone(),
                reason: e.to_string(),
            })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(BackendError::SpawnFailed {
                    program: self.ffmpeg.clone(),
                    reason: "stdout was not captured".to_string(),
                });
            }
        };

        Ok(Box::new(FfmpegCliSource {
            info,
            frame_len: info.frame_len(),
            child,
            stdout,
            exhausted: false,
        }))
    }

    fn open_sink(&self, path: &Path, params: SinkParams) -> Result<Box<dyn FrameSink>, BackendError> {
        // Creating the file up front surfaces a missing or read-only directory
        // now rather than when ffmpeg gives up later.
        File::create(path)?;

        let spawned = Command::new(&self.ffmpeg)
            .args(encode_args(path, &params))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let _ = std::fs::remove_file(path);
                return Err(BackendError::SpawnFailed {
                    program: self.ffmpeg.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let stdin = child.stdin.take();
        let stderr = drain_stderr(&mut child);
        info!("Encoding {}x{} @ {} fps to {}", params.width, params.height, params.frame_rate, path.display());

        Ok(Box::new(FfmpegCliSink {
            program: self.ffmpeg.clone(),
            path: path.to_path_buf(),
            params,
            child: Some(child),
            stdin,
            stderr,
        }))
    }
}

/// Raw frames read from `ffmpeg -f rawvideo` on stdout
struct FfmpegCliSource {
    info: StreamInfo,
    frame_len: usize,
    child: Child,
    stdout: ChildStdout,
    exhausted: bool,
}

impl FrameSource for FfmpegCliSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn read_frame(&mut self) -> FrameRead {
        if self.exhausted {
            return FrameRead::Exhausted;
        }

        let mut buffer = vec![0u8; self.frame_len];
        match self.stdout.read_exact(&mut buffer) {
            Ok(()) => match Frame::from_rgb_bytes(self.info.width, self.info.height, buffer) {
                Some(frame) => FrameRead::Frame(frame),
                None => {
                    self.exhausted = true;
                    FrameRead::Exhausted
                }
            },
            Err(e) => {
                if e.kind() != ErrorKind::UnexpectedEof {
                    debug!("Decoder pipe read failed: {}", e);
                }
                self.exhausted = true;
                FrameRead::Exhausted
            }
        }
    }
}

impl Drop for FfmpegCliSource {
    fn drop(&mut self) {
        // The decoder may still be producing frames nobody will read
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Raw frames written to `ffmpeg -f rawvideo -i -` on stdin
struct FfmpegCliSink {
    program: String,
    path: PathBuf,
    params: SinkParams,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<Vec<u8>>>,
}

impl FfmpegCliSink {
    fn collect_stderr(&mut self) -> String {
        let bytes = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).trim().to_string()
    }
}

/// Read the encoder's stderr to the end on its own thread
///
/// ffmpeg blocks once the pipe buffer fills, and then stops reading frames
/// from stdin.
fn drain_stderr(child: &mut Child) -> Option<JoinHandle<Vec<u8>>> {
    let mut pipe = child.stderr.take()?;
    let spawned = thread::Builder::new()
        .name("ffmpeg-stderr".to_string())
        .spawn(move || {
            let mut captured = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut captured) {
                debug!("Encoder stderr read failed: {}", e);
            }
            captured
        });

    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Could not start encoder stderr reader: {}", e);
            None
        }
    }
}

impl FrameSink for FfmpegCliSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), BackendError> {
        check_frame_size(frame, &self.params)?;

        let stdin = self.stdin.as_mut().ok_or_else(|| {
            BackendError::Io(std::io::Error::new(ErrorKind::BrokenPipe, "encoder input already closed"))
        })?;
        stdin.write_all(frame.as_rgb_bytes())?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), BackendError> {
        // Closing stdin is the end-of-stream signal for the encoder
        drop(self.stdin.take());

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child.wait()?;
        let stderr = self.collect_stderr();
        if !status.success() {
            return Err(BackendError::ProcessFailed {
                program: self.program.clone(),
                status: status.to_string(),
                stderr,
            });
        }

        debug!("Encoder finished writing {}", self.path.display());
        Ok(())
    }
}

impl Drop for FfmpegCliSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            // Let ffmpeg finalize whatever it already received
            match child.wait() {
                Ok(status) if !status.success() => {
                    warn!("Encoder for {} exited with {}", self.path.display(), status);
                }
                Err(e) => warn!("Could not reap encoder for {}: {}", self.path.display(), e),
                _ => {}
            }
        }
        self.collect_stderr();
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

/// Read the first video stream out of `ffprobe -print_format json -show_streams`
pub(crate) fn parse_probe_output(json: &[u8], path: &Path) -> Result<StreamInfo, BackendError> {
    let probe_failed = |reason: String| BackendError::ProbeFailed {
        path: path.display().to_string(),
        reason,
    };

    let output: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| probe_failed(format!("invalid ffprobe output: {e}")))?;

    let stream = output
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref().map_or(true, |kind| kind == "video"))
        .ok_or_else(|| BackendError::NoVideoStream { path: path.display().to_string() })?;

    let width = stream.width.filter(|w| *w > 0)
        .ok_or_else(|| probe_failed("stream has no width".to_string()))?;
    let height = stream.height.filter(|h| *h > 0)
        .ok_or_else(|| probe_failed("stream has no height".to_string()))?;

    // avg_frame_rate is "0/0" for some containers; r_frame_rate is always set
    let frame_rate = [stream.avg_frame_rate, stream.r_frame_rate]
        .into_iter()
        .flatten()
        .find_map(|rate| rate.parse::<FrameRate>().ok())
        .ok_or_else(|| probe_failed("stream has no usable frame rate".to_string()))?;

    Ok(StreamInfo { width, height, frame_rate })
}

fn probe_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-v", "error",
        "-print_format", "json",
        "-show_streams",
        "-select_streams", "v:0",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(path.as_os_str().to_owned());
    args
}

fn decode_args(path: &Path) -> Vec<OsString> {
    // Rotation would swap the probed dimensions; every decoded frame is
    // emitted once, without duplication or dropping.
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-noautorotate", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_owned());
    args.extend(
        ["-map", "0:v:0", "-vsync", "passthrough", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"]
            .iter()
            .map(OsString::from),
    );
    args
}

fn encode_args(path: &Path, params: &SinkParams) -> Vec<OsString> {
    let size = format!("{}x{}", params.width, params.height);
    let rate = params.frame_rate.to_string();

    let mut args: Vec<OsString> = [
        "-hide_banner", "-loglevel", "error",
        "-y",
        "-f", "rawvideo",
        "-pix_fmt", "rgb24",
        "-s", size.as_str(),
        "-r", rate.as_str(),
        "-i", "-",
        "-an",
        "-c:v", "mpeg4",
        "-vtag", "XVID",
        "-q:v", "5",
        "-pix_fmt", "yuv420p",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(path.as_os_str().to_owned());
    args
}
