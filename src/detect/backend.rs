use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::detect::result::{Detection, Skeleton};
use crate::error::ProviderError;
use crate::frame::Frame;

/// Object detection capability.
///
/// Implementations hold no cross-frame state that affects results. A call may fail without
/// affecting later calls; the session treats a failed call as an empty detection list.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Provider identifier used in log lines.
    fn name(&self) -> &'static str;

    /// Detect scored, classed boxes in `frame`.
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, ProviderError>;
}

/// Pose estimation capability.
#[async_trait]
pub trait PoseEstimator: Send + Sync {
    /// Provider identifier used in log lines.
    fn name(&self) -> &'static str;

    /// Estimate skeletons in `frame`.
    async fn estimate_poses(&self, frame: &Frame) -> Result<Vec<Skeleton>, ProviderError>;
}

/// Pending provider initialisation. Loads run concurrently and settle independently.
pub type ProviderLoad<P> = Pin<Box<dyn Future<Output = anyhow::Result<Arc<P>>> + Send>>;

/// Wrap an already-constructed provider as a load that resolves immediately.
pub fn ready<P: ?Sized + Send + Sync + 'static>(provider: Arc<P>) -> ProviderLoad<P> {
    Box::pin(async move { Ok(provider) })
}
