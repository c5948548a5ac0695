//! Live capture source.
//!
//! `CameraSource` acquires a capture device selected by facing preference. Refused or
//! missing devices surface as `SourceError::CaptureDenied` from `connect`. Timestamps are
//! seconds since the device was acquired.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

use super::synthetic::pitch_pixels;
use super::{toggle_pause, FrameSource, SourceState, SourceStats, STUB_SCHEME};
#[cfg(feature = "ingest-v4l2")]
use super::v4l2::V4l2Camera;
use crate::error::SourceError;
use crate::frame::Frame;

/// Which camera the operator asked for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FacingMode {
    /// User-facing camera.
    #[default]
    Front,
    /// Environment-facing camera.
    Back,
}

impl FromStr for FacingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" | "user" => Ok(FacingMode::Front),
            "back" | "environment" => Ok(FacingMode::Back),
            other => Err(anyhow!("facing mode must be front or back, got {other:?}")),
        }
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingMode::Front => f.write_str("front"),
            FacingMode::Back => f.write_str("back"),
        }
    }
}

/// Configuration for a capture source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub facing: FacingMode,
    /// Device used for `FacingMode::Front` (e.g., "/dev/video0" or "stub://front").
    pub front_device: String,
    /// Device used for `FacingMode::Back`.
    pub back_device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl CameraConfig {
    /// Device path for the configured facing mode.
    pub fn device(&self) -> &str {
        match self.facing {
            FacingMode::Front => &self.front_device,
            FacingMode::Back => &self.back_device,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing: FacingMode::Front,
            front_device: "/dev/video0".to_string(),
            back_device: "/dev/video1".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Capture device frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2Camera),
    Unsupported { device: String },
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Self {
        let device = config.device().to_string();
        let backend = if device.starts_with(STUB_SCHEME) {
            CameraBackend::Synthetic(SyntheticCamera::new(config))
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                CameraBackend::Device(V4l2Camera::new(config))
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                CameraBackend::Unsupported { device }
            }
        };
        Self { backend }
    }
}

impl FrameSource for CameraSource {
    fn connect(&mut self) -> Result<(), SourceError> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
            CameraBackend::Unsupported { device } => Err(SourceError::CaptureDenied {
                device: device.clone(),
                reason: "capture devices require the ingest-v4l2 feature".to_string(),
            }),
        }
    }

    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
            CameraBackend::Unsupported { .. } => {
                Err(SourceError::Decode("capture device not connected".to_string()))
            }
        }
    }

    fn state(&self) -> SourceState {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.state,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.state(),
            CameraBackend::Unsupported { .. } => SourceState::Idle,
        }
    }

    fn set_paused(&mut self, paused: bool) {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => toggle_pause(&mut source.state, paused),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.set_paused(paused),
            CameraBackend::Unsupported { .. } => {}
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.release(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.release(),
            CameraBackend::Unsupported { .. } => {}
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
            CameraBackend::Unsupported { device } => SourceStats {
                frames_captured: 0,
                origin: device.clone(),
                state: SourceState::Idle,
            },
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

/// Devices named `stub://denied...` refuse access, for exercising the capture-denied path.
const DENIED_STUB_PREFIX: &str = "stub://denied";

struct SyntheticCamera {
    config: CameraConfig,
    frame_index: u64,
    state: SourceState,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_index: 0,
            state: SourceState::Idle,
        }
    }

    fn connect(&mut self) -> Result<(), SourceError> {
        let device = self.config.device().to_string();
        if device.starts_with(DENIED_STUB_PREFIX) {
            return Err(SourceError::CaptureDenied {
                device,
                reason: "permission denied".to_string(),
            });
        }
        self.state = SourceState::Streaming;
        log::info!(
            "CameraSource: connected to {} ({} facing, synthetic)",
            device,
            self.config.facing
        );
        Ok(())
    }

    /// Synthetic capture never ends; time advances one frame period per call.
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        match self.state {
            SourceState::Streaming | SourceState::Paused => {}
            SourceState::Ended | SourceState::Released => return Err(SourceError::EndOfStream),
            SourceState::Idle => {
                return Err(SourceError::Decode("capture device not connected".to_string()))
            }
        }
        let fps = self.config.target_fps.max(1);
        let timestamp = self.frame_index as f64 / f64::from(fps);
        let pixels = pitch_pixels(self.config.width, self.config.height, self.frame_index);
        let frame = Frame::new(pixels, self.config.width, self.config.height, timestamp)
            .map_err(|err| SourceError::Decode(err.to_string()))?;
        self.frame_index += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        if self.state != SourceState::Released {
            log::info!("CameraSource: released {}", self.config.device());
        }
        self.state = SourceState::Released;
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_index,
            origin: self.config.device().to_string(),
            state: self.state,
        }
    }
}
