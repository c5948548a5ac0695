//! V4L2 capture backend for `CameraSource`.
//!
//! The device is opened on `connect` and closed on `release`. Any failure to open or
//! configure the device is reported as capture denied.

use ouroboros::self_referencing;
use std::time::Instant;

use super::camera::CameraConfig;
use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{toggle_pause, SourceState, SourceStats};
use crate::error::SourceError;
use crate::frame::Frame;

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub(crate) struct V4l2Camera {
    config: CameraConfig,
    state: Option<DeviceState>,
    source_state: SourceState,
    connected_at: Option<Instant>,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
    pixel_format: PixelFormat,
}

impl V4l2Camera {
    pub(crate) fn new(config: CameraConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            source_state: SourceState::Idle,
            connected_at: None,
            frame_count: 0,
            pixel_format: PixelFormat::Rgb24,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<(), SourceError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device_path = self.config.device().to_string();
        let denied = |reason: String| SourceError::CaptureDenied {
            device: device_path.clone(),
            reason,
        };

        let mut device = v4l::Device::with_path(&device_path).map_err(|err| denied(err.to_string()))?;
        let mut format = device
            .format()
            .map_err(|err| denied(format!("read format: {err}")))?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set RGB format on {}: {}",
                    device_path,
                    err
                );
                device
                    .format()
                    .map_err(|err| denied(format!("read format after set failure: {err}")))?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            denied(format!("unsupported pixel format {}", format.fourcc))
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("CameraSource: failed to set fps on {}: {}", device_path, err);
            }
        }

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|err| denied(format!("create buffer stream: {err}")))?;

        self.active_width = format.width;
        self.active_height = format.height;
        self.pixel_format = pixel_format;
        self.state = Some(state);
        self.source_state = SourceState::Streaming;
        self.connected_at = Some(Instant::now());

        log::info!(
            "CameraSource: connected to {} ({} facing, {}x{} {:?})",
            device_path,
            self.config.facing,
            self.active_width,
            self.active_height,
            self.pixel_format
        );
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame, SourceError> {
        use v4l::io::traits::CaptureStream;

        if self.source_state == SourceState::Released {
            return Err(SourceError::EndOfStream);
        }
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| SourceError::Decode("capture device not connected".to_string()))?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| SourceError::Decode(format!("capture frame: {err}")))?;

        let pixels = normalize_to_rgb(buf, self.active_width, self.active_height, self.pixel_format)
            .map_err(|err| SourceError::Decode(err.to_string()))?;
        self.frame_count += 1;
        let timestamp = self
            .connected_at
            .map(|at| at.elapsed().as_secs_f64())
            .unwrap_or_default();

        Frame::new(pixels, self.active_width, self.active_height, timestamp)
            .map_err(|err| SourceError::Decode(err.to_string()))
    }

    pub(crate) fn state(&self) -> SourceState {
        self.source_state
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        toggle_pause(&mut self.source_state, paused);
    }

    /// Drop the stream and device handle, giving the hardware back.
    pub(crate) fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("CameraSource: released {}", self.config.device());
        }
        self.source_state = SourceState::Released;
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            origin: self.config.device().to_string(),
            state: self.source_state,
        }
    }
}
