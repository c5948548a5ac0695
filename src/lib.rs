//! Pitch Analytica
//!
//! Real-time player tracking and spatial analytics over a stream of video frames.
//!
//! # Architecture
//!
//! Every sampling tick runs one cycle over the current frame:
//!
//! 1. **Detect**: an object detector and a pose estimator run concurrently. Either may fail
//!    on any frame; a failure counts as an empty result for that frame.
//! 2. **Fuse**: each confident `person` box is paired with the skeleton whose nose is nearest
//!    to the box centroid.
//! 3. **Track**: the centroid is quantised into an identity key and compared with the last
//!    sighting of that key to estimate speed.
//! 4. **Zone**: the centroid is classified into left wing, center or right wing.
//! 5. **Render**: the overlay is cleared and redrawn, and one status line is logged.
//!
//! # Module Structure
//!
//! - `frame`: immutable timestamped RGB frames
//! - `ingest`: file and capture-device frame sources
//! - `detect`: capability provider traits, stub and ONNX backends, readiness bootstrap
//! - `fusion`, `track`, `zone`: per-frame analysis
//! - `overlay`, `event_log`: operator-facing output
//! - `pipeline`, `session`: cycle execution and the sampling loop
//! - `config`, `ui`: daemon configuration and terminal output

pub mod config;
pub mod detect;
pub mod error;
pub mod event_log;
pub mod frame;
pub mod fusion;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod session;
pub mod track;
pub mod ui;
pub mod zone;

pub use config::{AnalyticaConfig, SourceKind};
pub use detect::{
    BoundingBox, Detection, Keypoint, ObjectDetector, PoseEstimator, ProviderRegistry,
    ProviderSettings, Skeleton, StubDetector, StubPoseEstimator,
};
pub use error::{CycleError, ProviderError, RenderError, SessionError, SourceError};
pub use event_log::{EventLog, LogEntry, Severity, MAX_LOG_ENTRIES};
pub use frame::Frame;
pub use fusion::{fuse, FusedPlayer};
pub use ingest::{
    CameraConfig, CameraSource, FacingMode, FileConfig, FileSource, FrameSource, MediaMetadata,
    SourceState,
};
pub use overlay::{OverlayRenderer, OverlaySurface, RasterSurface, RecordingSurface};
pub use pipeline::{CycleOutcome, CycleReport, Pipeline, PlayerState, Providers};
pub use session::{Session, SessionConfig, SessionControl, SessionState, SessionStats, TickOutcome};
pub use track::{observe, Kinematics, NearestTrackStore, QuantizedTrackStore, TrackEntry, TrackStore};
pub use zone::{lateral_distance, zone, Zone};
