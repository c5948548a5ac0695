//! Error kinds for the analysis core.
//!
//! Every failure here is contained by the session: providers, sources and the renderer
//! report through these types and the loop turns them into event log entries.

use std::time::Duration;

use thiserror::Error;

/// Failures raised by object detectors and pose estimators.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider never became ready (load failed or the readiness wait expired).
    #[error("{provider} unavailable: {reason}")]
    ModelUnavailable {
        provider: &'static str,
        reason: String,
    },
    /// A single detector call failed.
    #[error("detection failed: {0}")]
    Detection(String),
    /// A single pose-estimator call failed.
    #[error("pose estimation failed: {0}")]
    Pose(String),
    /// A provider call did not resolve within the per-call budget.
    #[error("{provider} call exceeded {timeout:?}")]
    Timeout {
        provider: &'static str,
        timeout: Duration,
    },
}

/// Failures raised while acquiring or reading a frame source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Capture device access was refused or the device could not be opened.
    #[error("capture denied for {device}: {reason}")]
    CaptureDenied { device: String, reason: String },
    /// A file-backed source could not be opened.
    #[error("failed to open {path}: {reason}")]
    Open { path: String, reason: String },
    /// The source has no more frames.
    #[error("end of stream")]
    EndOfStream,
    /// A frame could not be decoded or captured.
    #[error("frame decode failed: {0}")]
    Decode(String),
}

/// Drawing onto the overlay surface failed.
#[derive(Debug, Error)]
#[error("render failed: {0}")]
pub struct RenderError(pub String);

/// Session lifecycle misuse.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session is already {0}")]
    AlreadyActive(&'static str),
    #[error("session is not active")]
    NotActive,
    #[error("no capability provider became ready")]
    ProvidersUnavailable,
    #[error("sampling interval must be greater than zero")]
    ZeroInterval,
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Error raised by one processing cycle. Logged, never fatal.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("fusion failed: {0}")]
    Fusion(String),
}
