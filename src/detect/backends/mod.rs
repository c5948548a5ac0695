pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{StubDetector, StubPoseEstimator};

#[cfg(feature = "backend-tract")]
pub use tract::{TractDetector, TractPoseEstimator};
