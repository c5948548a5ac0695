//! One processing cycle.
//!
//! A cycle takes one frame through the whole analysis:
//! 1. Detector and pose estimator run concurrently, each under a call timeout.
//! 2. Player detections are fused with skeletons.
//! 3. Kinematics are derived from the track store and each player is zoned.
//! 4. The overlay is redrawn from scratch.
//! 5. Exactly one event log line records the outcome.
//!
//! Nothing in a cycle is fatal. A failed provider contributes an empty list, and render
//! failures are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use crate::detect::{
    Detection, ObjectDetector, PoseEstimator, Skeleton, OBJECT_DETECTOR, POSE_ESTIMATOR,
};
use crate::error::{CycleError, ProviderError};
use crate::event_log::EventLog;
use crate::frame::Frame;
use crate::fusion::fuse;
use crate::overlay::{OverlayRenderer, OverlaySurface, PlayerOverlay};
use crate::track::{observe, TrackStore};
use crate::zone::{lateral_distance, zone, Zone};

/// Providers available to a session. `None` marks a provider that failed to load.
#[derive(Clone, Default)]
pub struct Providers {
    pub detector: Option<Arc<dyn ObjectDetector>>,
    pub estimator: Option<Arc<dyn PoseEstimator>>,
}

impl Providers {
    pub fn new(detector: Arc<dyn ObjectDetector>, estimator: Arc<dyn PoseEstimator>) -> Self {
        Self {
            detector: Some(detector),
            estimator: Some(estimator),
        }
    }

    /// True when neither provider can contribute anything.
    pub fn is_empty(&self) -> bool {
        self.detector.is_none() && self.estimator.is_none()
    }
}

/// Per-player analysis result for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerState {
    pub track_id: String,
    pub centroid: (f32, f32),
    pub speed: f32,
    pub zone: Zone,
    pub lateral_px: f32,
    pub has_skeleton: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    Players(usize),
    NoPlayers,
    Failed(String),
}

/// What one cycle produced.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub timestamp: f64,
    pub outcome: CycleOutcome,
    pub players: Vec<PlayerState>,
    pub provider_errors: Vec<String>,
}

/// Runs processing cycles with a fixed renderer and provider call timeout.
pub struct Pipeline {
    renderer: OverlayRenderer,
    call_timeout: Duration,
}

impl Pipeline {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            renderer: OverlayRenderer::new(),
            call_timeout,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Run one frame through detection, fusion, kinematics, zoning and rendering.
    pub async fn run_cycle(
        &self,
        frame: &Frame,
        providers: &Providers,
        tracks: &mut dyn TrackStore,
        surface: &mut dyn OverlaySurface,
        log: &mut EventLog,
    ) -> CycleReport {
        let t = frame.timestamp_secs;
        let (detections, skeletons) = tokio::join!(
            self.detect(providers.detector.as_deref(), frame),
            self.estimate(providers.estimator.as_deref(), frame),
        );

        let (detections, detector_error) = settle(detections);
        let (skeletons, pose_error) = settle(skeletons);

        // Boxes are still drawn when only the pose estimator failed; the line reports the error.
        let result = self.analyse(frame, &detections, &skeletons, tracks, surface);
        let provider_error = detector_error.as_ref().or(pose_error.as_ref());
        let outcome = match (&result, provider_error) {
            (Err(err), _) => {
                log.error(format!("Error at {t:.2}s: {err}"));
                CycleOutcome::Failed(err.to_string())
            }
            (Ok(_), Some(err)) => {
                log.error(format!("Error at {t:.2}s: {err}"));
                CycleOutcome::Failed(err.to_string())
            }
            (Ok(players), None) if players.is_empty() => {
                log.warn(format!("No players detected at {t:.2}s"));
                CycleOutcome::NoPlayers
            }
            (Ok(players), None) => {
                log.info(format!("Frame @ {t:.2}s: {} players detected", players.len()));
                CycleOutcome::Players(players.len())
            }
        };

        let provider_errors = [detector_error, pose_error]
            .into_iter()
            .flatten()
            .map(|err| err.to_string())
            .collect();
        CycleReport {
            timestamp: t,
            outcome,
            players: result.unwrap_or_default(),
            provider_errors,
        }
    }

    fn analyse(
        &self,
        frame: &Frame,
        detections: &[Detection],
        skeletons: &[Skeleton],
        tracks: &mut dyn TrackStore,
        surface: &mut dyn OverlaySurface,
    ) -> Result<Vec<PlayerState>, CycleError> {
        let width = frame.width as f32;
        let fused = fuse(detections, skeletons);

        let mut states = Vec::with_capacity(fused.len());
        let mut overlays = Vec::with_capacity(fused.len());
        for player in &fused {
            let (cx, cy) = player.centroid();
            if !(cx.is_finite() && cy.is_finite()) {
                return Err(CycleError::Fusion(format!(
                    "non-finite centroid for box {:?}",
                    player.detection.bbox
                )));
            }
            let kinematics = observe(tracks, cx, cy, frame.timestamp_secs);
            let player_zone = zone(cx, width);
            let lateral_px = lateral_distance(cx, width);

            overlays.push(PlayerOverlay {
                bbox: player.detection.bbox,
                skeleton: player.skeleton,
                lateral_px,
                speed: kinematics.speed,
                zone: player_zone,
            });
            states.push(PlayerState {
                track_id: kinematics.id,
                centroid: (cx, cy),
                speed: kinematics.speed,
                zone: player_zone,
                lateral_px,
                has_skeleton: player.skeleton.is_some(),
            });
        }

        self.renderer.render(surface, frame.dimensions(), &overlays)?;
        Ok(states)
    }

    async fn detect(
        &self,
        detector: Option<&dyn ObjectDetector>,
        frame: &Frame,
    ) -> Result<Vec<Detection>, ProviderError> {
        let Some(detector) = detector else {
            return Ok(Vec::new());
        };
        match tokio::time::timeout(self.call_timeout, detector.detect(frame)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: OBJECT_DETECTOR,
                timeout: self.call_timeout,
            }),
        }
    }

    async fn estimate(
        &self,
        estimator: Option<&dyn PoseEstimator>,
        frame: &Frame,
    ) -> Result<Vec<Skeleton>, ProviderError> {
        let Some(estimator) = estimator else {
            return Ok(Vec::new());
        };
        match tokio::time::timeout(self.call_timeout, estimator.estimate_poses(frame)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: POSE_ESTIMATOR,
                timeout: self.call_timeout,
            }),
        }
    }
}

/// Split a provider result into its output and error. Failures count as empty output.
fn settle<T>(result: Result<Vec<T>, ProviderError>) -> (Vec<T>, Option<ProviderError>) {
    match result {
        Ok(items) => (items, None),
        Err(err) => (Vec::new(), Some(err)),
    }
}
