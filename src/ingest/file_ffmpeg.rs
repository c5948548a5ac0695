//! FFmpeg-backed local file decoding.
//!
//! The decoder is opened on `connect` and dropped on `release`, so the decode handle only
//! lives while the session does.

use ffmpeg_next as ffmpeg;

use super::file::{FileConfig, MediaMetadata, SampleClock};
use super::{toggle_pause, SourceState, SourceStats};
use crate::error::SourceError;
use crate::frame::{Frame, RGB_CHANNELS};

struct Decoder {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
}

pub(crate) struct FfmpegFileSource {
    clock: SampleClock,
    config: FileConfig,
    metadata: MediaMetadata,
    decoder: Option<Decoder>,
    frame_index: u64,
    state: SourceState,
}

impl FfmpegFileSource {
    pub(crate) fn new(config: FileConfig) -> Self {
        Self {
            clock: SampleClock::new(config.sample_interval),
            metadata: config.metadata.clone(),
            config,
            decoder: None,
            frame_index: 0,
            state: SourceState::Idle,
        }
    }

    pub(crate) fn metadata(&self) -> &MediaMetadata {
        &self.metadata
    }

    pub(crate) fn connect(&mut self) -> Result<(), SourceError> {
        let open_err = |reason: String| SourceError::Open {
            path: self.config.path.clone(),
            reason,
        };

        ffmpeg::init().map_err(|err| open_err(format!("initialize ffmpeg: {err}")))?;
        let input = ffmpeg::format::input(&self.config.path)
            .map_err(|err| open_err(err.to_string()))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| open_err("file has no video track".to_string()))?;
        let stream_index = stream.index();
        let avg_fps = f64::from(stream.avg_frame_rate());
        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|err| open_err(format!("load video decoder parameters: {err}")))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|err| open_err(format!("open video decoder: {err}")))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|err| open_err(format!("create scaler: {err}")))?;

        let duration_secs = if input.duration() > 0 {
            input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
        } else {
            self.config.metadata.duration_secs
        };
        self.metadata = MediaMetadata {
            duration_secs,
            avg_fps: if avg_fps.is_finite() && avg_fps > 0.0 {
                avg_fps
            } else {
                self.config.metadata.avg_fps
            },
            width: decoder.width(),
            height: decoder.height(),
        };

        self.decoder = Some(Decoder {
            input,
            stream_index,
            decoder,
            scaler,
        });
        self.state = SourceState::Streaming;
        log::info!(
            "FileSource: connected to {} (ffmpeg, {}x{} @ {:.2} fps, {:.1}s)",
            self.config.path,
            self.metadata.width,
            self.metadata.height,
            self.metadata.avg_fps,
            self.metadata.duration_secs
        );
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame, SourceError> {
        if matches!(self.state, SourceState::Ended | SourceState::Released) {
            return Err(SourceError::EndOfStream);
        }
        let dec = self
            .decoder
            .as_mut()
            .ok_or_else(|| SourceError::Decode("file source not connected".to_string()))?;

        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();

        for (stream, packet) in dec.input.packets() {
            if stream.index() != dec.stream_index {
                continue;
            }
            dec.decoder
                .send_packet(&packet)
                .map_err(|err| SourceError::Decode(format!("send packet: {err}")))?;

            if dec.decoder.receive_frame(&mut decoded).is_ok() {
                let timestamp = self.metadata.timestamp_of(self.frame_index);
                self.frame_index += 1;
                if !self.clock.admit(timestamp) {
                    continue;
                }
                dec.scaler
                    .run(&decoded, &mut rgb_frame)
                    .map_err(|err| SourceError::Decode(format!("scale frame to RGB: {err}")))?;
                let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
                return Frame::new(pixels, width, height, timestamp)
                    .map_err(|err| SourceError::Decode(err.to_string()));
            }
        }

        self.state = SourceState::Ended;
        Err(SourceError::EndOfStream)
    }

    pub(crate) fn state(&self) -> SourceState {
        self.state
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        toggle_pause(&mut self.state, paused);
    }

    pub(crate) fn release(&mut self) {
        if self.decoder.take().is_some() {
            log::info!("FileSource: released decoder for {}", self.config.path);
        }
        self.state = SourceState::Released;
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_index,
            origin: self.config.path.clone(),
            state: self.state,
        }
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32), SourceError> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = width as usize * RGB_CHANNELS;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let row_data = data
            .get(start..start + row_bytes)
            .ok_or_else(|| SourceError::Decode("decoded row is out of bounds".to_string()))?;
        pixels.extend_from_slice(row_data);
    }
    Ok((pixels, width, height))
}
