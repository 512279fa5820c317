use std::fmt;
use std::str::FromStr;

use image::imageops::FilterType;
use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Width every enhanced frame is stretched to
pub const TARGET_WIDTH: u32 = 2560;

/// Height every enhanced frame is stretched to
pub const TARGET_HEIGHT: u32 = 1440;

/// Represents a single decoded video frame
///
/// This is a simple wrapper around an RGB image buffer. Frames are transient:
/// read from a source, resized, handed to a sink, then dropped.
#[derive(Clone, Debug)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_fn(width, height, |_, _| {
            Rgb(color)
        });
        Self { buffer }
    }

    /// Create a frame from packed RGB24 bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data)
            .map(|buffer| Self { buffer })
    }

    /// Get the width of the frame
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    /// Get the height of the frame
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Packed RGB24 bytes, row-major with no padding
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Stretch the frame to exactly `width` x `height`, ignoring aspect ratio
    pub fn resized(&self, width: u32, height: u32, filter: ResizeFilter) -> Frame {
        if self.dimensions() == (width, height) {
            return self.clone();
        }

        let resized = image::imageops::resize(
            &self.buffer,
            width,
            height,
            filter.into(),
        );

        Frame::new(resized)
    }
}

/// Scaling filter applied when stretching frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Bilinear,
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Bilinear => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Exact frame rate as a rational number of frames per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    /// Build a rate, rejecting zero numerators and denominators
    pub fn new(num: u32, den: u32) -> Option<Self> {
        if num == 0 || den == 0 {
            None
        } else {
            Some(Self { num, den })
        }
    }

    /// Whole frames per second
    pub fn from_integer(fps: u32) -> Option<Self> {
        Self::new(fps, 1)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for FrameRate {
    type Err = String;

    /// Parses `30`, `30000/1001` or `25/1`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (num, den) = match s.split_once('/') {
            Some((num, den)) => (num.trim(), den.trim()),
            None => (s, "1"),
        };

        let num: u32 = num.parse().map_err(|_| format!("invalid frame rate: {s}"))?;
        let den: u32 = den.parse().map_err(|_| format!("invalid frame rate: {s}"))?;

        FrameRate::new(num, den).ok_or_else(|| format!("invalid frame rate: {s}"))
    }
}

/// What a source reports about its video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
}

impl StreamInfo {
    /// Size in bytes of one packed RGB24 frame at the source resolution
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// How a sink is configured when it is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkParams {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
}

impl SinkParams {
    /// The fixed 2560x1440 output at `frame_rate`
    pub fn target(frame_rate: FrameRate) -> Self {
        Self {
            width: TARGET_WIDTH,
            height: TARGET_HEIGHT,
            frame_rate,
        }
    }
}
