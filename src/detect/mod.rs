//! Capability providers: object detection and pose estimation.
//!
//! Providers are black boxes behind async traits. They are loaded once per session, may
//! become ready at different times, and may fail per call without affecting later calls.

mod backend;
pub mod backends;
mod bootstrap;
mod registry;
mod result;

pub use backend::{ready, ObjectDetector, PoseEstimator, ProviderLoad};
pub use backends::{StubDetector, StubPoseEstimator};
pub use bootstrap::{await_ready, DEFAULT_READY_TIMEOUT, OBJECT_DETECTOR, POSE_ESTIMATOR};
pub use registry::{ProviderRegistry, ProviderSettings};
pub use result::{BoundingBox, Detection, Keypoint, Skeleton, PERSON_CLASS, PLAYER_MIN_SCORE};
