use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::{ObjectDetector, PoseEstimator, ProviderLoad};
use super::backends::{StubDetector, StubPoseEstimator};

/// Settings handed to a provider factory.
#[derive(Clone, Debug)]
pub struct ProviderSettings {
    /// Model file for backends that need one.
    pub model_path: Option<PathBuf>,
    /// Model input width in pixels (pose models use `input_width` as their square size).
    pub input_width: u32,
    pub input_height: u32,
    /// Number of players the stub backend fabricates per frame.
    pub synthetic_players: usize,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            input_width: 640,
            input_height: 640,
            synthetic_players: 3,
        }
    }
}

type DetectorFactory =
    Box<dyn Fn(&ProviderSettings) -> ProviderLoad<dyn ObjectDetector> + Send + Sync>;
type PoseFactory =
    Box<dyn Fn(&ProviderSettings) -> ProviderLoad<dyn PoseEstimator> + Send + Sync>;

/// Named provider factories. A session resolves its configured backends here.
pub struct ProviderRegistry {
    detectors: BTreeMap<String, DetectorFactory>,
    estimators: BTreeMap<String, PoseFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            detectors: BTreeMap::new(),
            estimators: BTreeMap::new(),
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_detector("stub", stub_detector);
        registry.register_estimator("stub", stub_estimator);
        #[cfg(feature = "backend-tract")]
        register_tract(&mut registry);
        registry
    }

    pub fn register_detector<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ProviderSettings) -> ProviderLoad<dyn ObjectDetector> + Send + Sync + 'static,
    {
        self.detectors.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_estimator<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ProviderSettings) -> ProviderLoad<dyn PoseEstimator> + Send + Sync + 'static,
    {
        self.estimators.insert(name.to_string(), Box::new(factory));
    }

    /// Begin loading the named detector backend.
    pub fn detector(
        &self,
        name: &str,
        settings: &ProviderSettings,
    ) -> Result<ProviderLoad<dyn ObjectDetector>> {
        let factory = self
            .detectors
            .get(name)
            .ok_or_else(|| anyhow!("detector backend '{}' not registered", name))?;
        Ok(factory(settings))
    }

    /// Begin loading the named pose backend.
    pub fn estimator(
        &self,
        name: &str,
        settings: &ProviderSettings,
    ) -> Result<ProviderLoad<dyn PoseEstimator>> {
        let factory = self
            .estimators
            .get(name)
            .ok_or_else(|| anyhow!("pose backend '{}' not registered", name))?;
        Ok(factory(settings))
    }

    /// Registered detector names, sorted.
    pub fn detector_names(&self) -> Vec<String> {
        self.detectors.keys().cloned().collect()
    }

    pub fn estimator_names(&self) -> Vec<String> {
        self.estimators.keys().cloned().collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn stub_detector(settings: &ProviderSettings) -> ProviderLoad<dyn ObjectDetector> {
    let players = settings.synthetic_players;
    Box::pin(async move {
        let detector: Arc<dyn ObjectDetector> = Arc::new(StubDetector::synthetic(players));
        Ok::<_, anyhow::Error>(detector)
    })
}

fn stub_estimator(settings: &ProviderSettings) -> ProviderLoad<dyn PoseEstimator> {
    let players = settings.synthetic_players;
    Box::pin(async move {
        let estimator: Arc<dyn PoseEstimator> = Arc::new(StubPoseEstimator::synthetic(players));
        Ok::<_, anyhow::Error>(estimator)
    })
}

#[cfg(feature = "backend-tract")]
fn register_tract(registry: &mut ProviderRegistry) {
    registry.register_detector("tract", tract_detector);
    registry.register_estimator("tract", tract_estimator);
}

#[cfg(feature = "backend-tract")]
fn tract_detector(settings: &ProviderSettings) -> ProviderLoad<dyn ObjectDetector> {
    use super::backends::TractDetector;

    let settings = settings.clone();
    Box::pin(async move {
        let path = settings
            .model_path
            .ok_or_else(|| anyhow!("tract detector requires a model path"))?;
        let (width, height) = (settings.input_width, settings.input_height);
        let detector =
            tokio::task::spawn_blocking(move || TractDetector::load(path, width, height)).await??;
        let detector: Arc<dyn ObjectDetector> = Arc::new(detector);
        Ok::<_, anyhow::Error>(detector)
    })
}

#[cfg(feature = "backend-tract")]
fn tract_estimator(settings: &ProviderSettings) -> ProviderLoad<dyn PoseEstimator> {
    use super::backends::TractPoseEstimator;

    let settings = settings.clone();
    Box::pin(async move {
        let path = settings
            .model_path
            .ok_or_else(|| anyhow!("tract pose estimator requires a model path"))?;
        let size = settings.input_width;
        let estimator =
            tokio::task::spawn_blocking(move || TractPoseEstimator::load(path, size)).await??;
        let estimator: Arc<dyn PoseEstimator> = Arc::new(estimator);
        Ok::<_, anyhow::Error>(estimator)
    })
}
