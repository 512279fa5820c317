// src/video/ffmpeg_native.rs - Backend linking libav through ffmpeg-next

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{self, Flags};
use ffmpeg::util::frame;
use ffmpeg::{Packet, Rational};
use tracing::{debug, info, warn};

use crate::error::BackendError;
use crate::video::backend::{check_frame_size, FrameRead, FrameSink, FrameSource, VideoBackend};
use crate::video::types::{Frame, FrameRate, SinkParams, StreamInfo};

/// Decodes and encodes in-process with libav
#[derive(Debug)]
pub struct FfmpegNativeBackend;

impl FfmpegNativeBackend {
    pub fn new() -> Result<Self, BackendError> {
        ffmpeg::init()?;
        info!("Initialized libav video backend");
        Ok(Self)
    }
}

impl VideoBackend for FfmpegNativeBackend {
    fn name(&self) -> &str {
        "ffmpeg-native"
    }

    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, BackendError> {
        let input = ffmpeg::format::input(&path)?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| BackendError::NoVideoStream { path: path.display().to_string() })?;
        let stream_index = stream.index();

        let frame_rate = to_frame_rate(stream.avg_frame_rate())
            .or_else(|| to_frame_rate(stream.rate()))
            .ok_or_else(|| BackendError::ProbeFailed {
                path: path.display().to_string(),
                reason: "stream has no usable frame rate".to_string(),
            })?;

        let decoder = codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        let (width, height) = (decoder.width(), decoder.height());
        let scaler = scaling::Context::get(
            decoder.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            Flags::BILINEAR,
        )?;

        debug!("Opened {}: {}x{} @ {} fps ({:?})", path.display(), width, height, frame_rate, decoder.format());

        Ok(Box::new(NativeSource {
            info: StreamInfo { width, height, frame_rate },
            input,
            decoder,
            scaler,
            stream_index,
            eof_sent: false,
            exhausted: false,
        }))
    }

    fn open_sink(&self, path: &Path, params: SinkParams) -> Result<Box<dyn FrameSink>, BackendError> {
        // Same early failure for unwritable directories as the process backend
        std::fs::File::create(path)?;

        let mut output = ffmpeg::format::output(&path)?;
        let codec = ffmpeg::encoder::find(codec::Id::MPEG4).ok_or(ffmpeg::Error::EncoderNotFound)?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let rate = Rational::new(params.frame_rate.num as i32, params.frame_rate.den as i32);
        let time_base = rate.invert();

        let mut stream = output.add_stream(codec)?;
        let stream_index = stream.index();

        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder.set_width(params.width);
        encoder.set_height(params.height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_frame_rate(Some(rate));
        encoder.set_time_base(time_base);
        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder.open_as(codec)?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);

        output.write_header()?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(time_base);

        let scaler = scaling::Context::get(
            Pixel::RGB24,
            params.width,
            params.height,
            Pixel::YUV420P,
            params.width,
            params.height,
            Flags::BILINEAR,
        )?;

        info!("Encoding {}x{} @ {} fps to {}", params.width, params.height, params.frame_rate, path.display());

        Ok(Box::new(NativeSink {
            path: path.to_path_buf(),
            params,
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base: time_base,
            stream_time_base,
            next_pts: 0,
            finished: false,
        }))
    }
}

fn to_frame_rate(rate: Rational) -> Option<FrameRate> {
    let num = u32::try_from(rate.numerator()).ok()?;
    let den = u32::try_from(rate.denominator()).ok()?;
    FrameRate::new(num, den)
}

struct NativeSource {
    info: StreamInfo,
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    eof_sent: bool,
    exhausted: bool,
}

impl NativeSource {
    fn next_decoded(&mut self) -> Result<Option<frame::Video>, ffmpeg::Error> {
        loop {
            let mut decoded = frame::Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return Ok(Some(decoded));
            }
            if self.eof_sent {
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() == self.stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn to_frame(&mut self, decoded: &frame::Video) -> Result<Option<Frame>, ffmpeg::Error> {
        let mut rgb = frame::Video::empty();
        self.scaler.run(decoded, &mut rgb)?;

        let row_len = self.info.width as usize * 3;
        let stride = rgb.stride(0);
        let data = rgb.data(0);

        let mut packed = Vec::with_capacity(row_len * self.info.height as usize);
        for y in 0..self.info.height as usize {
            let start = y * stride;
            packed.extend_from_slice(&data[start..start + row_len]);
        }

        Ok(Frame::from_rgb_bytes(self.info.width, self.info.height, packed))
    }
}

impl FrameSource for NativeSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn read_frame(&mut self) -> FrameRead {
        if self.exhausted {
            return FrameRead::Exhausted;
        }

        let converted = self
            .next_decoded()
            .and_then(|decoded| match decoded {
                Some(decoded) => self.to_frame(&decoded),
                None => Ok(None),
            });

        match converted {
            Ok(Some(frame)) => FrameRead::Frame(frame),
            Ok(None) => {
                self.exhausted = true;
                FrameRead::Exhausted
            }
            Err(e) => {
                debug!("Decoding stopped: {}", e);
                self.exhausted = true;
                FrameRead::Exhausted
            }
        }
    }
}

struct NativeSink {
    path: PathBuf,
    params: SinkParams,
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::codec::encoder::video::Encoder,
    scaler: scaling::Context,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    next_pts: i64,
    finished: bool,
}

impl NativeSink {
    fn drain_packets(&mut self) -> Result<(), ffmpeg::Error> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet.write_interleaved(&mut self.output)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), ffmpeg::Error> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.encoder.send_eof()?;
        self.drain_packets()?;
        self.output.write_trailer()
    }
}

impl FrameSink for NativeSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), BackendError> {
        check_frame_size(frame, &self.params)?;

        let row_len = self.params.width as usize * 3;
        let mut rgb = frame::Video::new(Pixel::RGB24, self.params.width, self.params.height);
        let stride = rgb.stride(0);
        let data = rgb.data_mut(0);
        for (y, row) in frame.as_rgb_bytes().chunks_exact(row_len).enumerate() {
            let start = y * stride;
            data[start..start + row_len].copy_from_slice(row);
        }

        let mut yuv = frame::Video::empty();
        self.scaler.run(&rgb, &mut yuv)?;
        yuv.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder.send_frame(&yuv)?;
        self.drain_packets()?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), BackendError> {
        self.close()?;
        debug!("Encoder finished writing {}", self.path.display());
        Ok(())
    }
}

impl Drop for NativeSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Could not finalize {}: {}", self.path.display(), e);
        }
    }
}
