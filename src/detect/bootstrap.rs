use std::sync::Arc;
use std::time::Duration;

use crate::detect::backend::ProviderLoad;
use crate::error::ProviderError;

/// Default bound on how long a provider may take to become ready.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider kind labels used in readiness events.
pub const OBJECT_DETECTOR: &str = "object detector";
pub const POSE_ESTIMATOR: &str = "pose estimator";

/// Wait for a provider load to settle, bounded by `wait`.
///
/// A load that fails or does not finish in time yields `ModelUnavailable`.
pub async fn await_ready<P: ?Sized>(
    provider: &'static str,
    load: ProviderLoad<P>,
    wait: Duration,
) -> Result<Arc<P>, ProviderError> {
    match tokio::time::timeout(wait, load).await {
        Ok(Ok(ready)) => Ok(ready),
        Ok(Err(err)) => Err(ProviderError::ModelUnavailable {
            provider,
            reason: format!("{err:#}"),
        }),
        Err(_) => Err(ProviderError::ModelUnavailable {
            provider,
            reason: format!("not ready after {wait:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backend::{ready, ObjectDetector};
    use crate::detect::backends::StubDetector;

    #[tokio::test]
    async fn ready_load_resolves() {
        let detector: Arc<dyn ObjectDetector> = Arc::new(StubDetector::empty());
        let loaded = await_ready(OBJECT_DETECTOR, ready(detector), Duration::from_secs(1)).await;
        assert!(loaded.is_ok());
    }

    #[tokio::test]
    async fn failed_load_is_model_unavailable() {
        let load: ProviderLoad<dyn ObjectDetector> =
            Box::pin(async { Err(anyhow::anyhow!("weights missing")) });
        let err = await_ready(OBJECT_DETECTOR, load, Duration::from_secs(1))
            .await
            .err()
            .expect("load must fail");
        assert!(matches!(err, ProviderError::ModelUnavailable { .. }));
        assert!(err.to_string().contains("weights missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_load_times_out() {
        let load: ProviderLoad<dyn ObjectDetector> = Box::pin(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let detector: Arc<dyn ObjectDetector> = Arc::new(StubDetector::empty());
            Ok(detector)
        });
        let err = await_ready(POSE_ESTIMATOR, load, DEFAULT_READY_TIMEOUT)
            .await
            .err()
            .expect("load must time out");
        assert!(err.to_string().contains("not ready after"));
    }
}
