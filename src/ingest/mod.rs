//! Frame ingestion sources.
//!
//! Two kinds of source feed a session:
//! - `FileSource`: a decoded video file (feature: ingest-file-ffmpeg)
//! - `CameraSource`: a live capture device chosen by facing mode (feature: ingest-v4l2)
//!
//! Both accept `stub://` paths, which produce synthetic frames with deterministic
//! timestamps. Tests and the demo binary run entirely on stub sources.
//!
//! Sources hand out owned `Frame`s; they never keep a frame after returning it.

pub mod camera;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub(crate) mod v4l2;

use std::fmt;

use crate::error::SourceError;
use crate::frame::Frame;

pub use camera::{CameraConfig, CameraSource, FacingMode};
pub use file::{FileConfig, FileSource, MediaMetadata};

/// Prefix that selects synthetic backends.
pub const STUB_SCHEME: &str = "stub://";

/// Playback state shared by every source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceState {
    /// Created but not yet connected.
    Idle,
    Streaming,
    Paused,
    /// No more frames will be produced.
    Ended,
    /// Underlying handle has been given back.
    Released,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceState::Idle => "idle",
            SourceState::Streaming => "streaming",
            SourceState::Paused => "paused",
            SourceState::Ended => "ended",
            SourceState::Released => "released",
        };
        f.write_str(label)
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub origin: String,
    pub state: SourceState,
}

/// A supplier of timestamped frames.
pub trait FrameSource: Send {
    /// Acquire the underlying file or device.
    fn connect(&mut self) -> Result<(), SourceError>;

    /// Produce the next frame. Returns `SourceError::EndOfStream` once exhausted.
    fn next_frame(&mut self) -> Result<Frame, SourceError>;

    fn state(&self) -> SourceState;

    fn set_paused(&mut self, paused: bool);

    /// Give back the underlying handle. Idempotent.
    fn release(&mut self);

    fn stats(&self) -> SourceStats;

    fn is_paused(&self) -> bool {
        self.state() == SourceState::Paused
    }

    fn is_ended(&self) -> bool {
        matches!(self.state(), SourceState::Ended | SourceState::Released)
    }
}

/// Pause/resume transition shared by the concrete sources.
pub(crate) fn toggle_pause(state: &mut SourceState, paused: bool) {
    *state = match (*state, paused) {
        (SourceState::Streaming, true) => SourceState::Paused,
        (SourceState::Paused, false) => SourceState::Streaming,
        (current, _) => current,
    };
}
