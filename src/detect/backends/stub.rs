use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::backend::{ObjectDetector, PoseEstimator};
use crate::detect::result::{BoundingBox, Detection, Keypoint, Skeleton, PERSON_CLASS};
use crate::error::ProviderError;
use crate::frame::Frame;

/// Horizontal drift of synthetic players in pixels per second.
const SYNTHETIC_DRIFT_PX_PER_SEC: f32 = 40.0;

/// Score range and positional noise applied by [`StubDetector::with_jitter`].
const JITTER_SCORES: std::ops::Range<f32> = 0.35..0.95;
const JITTER_PX: f32 = 2.0;

/// Output plan shared by the stub providers.
enum Script<T> {
    /// The same output on every call.
    Fixed(Vec<T>),
    /// One scripted outcome per call; empty output once exhausted.
    Sequence(Mutex<VecDeque<Result<Vec<T>, String>>>),
    /// Players derived from the frame geometry and timestamp.
    Synthetic(usize),
}

impl<T: Clone> Script<T> {
    fn next(&self, frame: &Frame, synth: impl Fn(&BoundingBox) -> T) -> Result<Vec<T>, String> {
        match self {
            Script::Fixed(items) => Ok(items.clone()),
            Script::Sequence(queue) => {
                let mut queue = queue
                    .lock()
                    .map_err(|_| "stub script lock poisoned".to_string())?;
                queue.pop_front().unwrap_or_else(|| Ok(Vec::new()))
            }
            Script::Synthetic(players) => Ok(synthetic_players(frame, *players)
                .iter()
                .map(synth)
                .collect()),
        }
    }
}

/// Stub object detector for tests and the synthetic demo.
pub struct StubDetector {
    script: Script<Detection>,
    latency: Option<Duration>,
    jitter: Option<Mutex<StdRng>>,
}

impl StubDetector {
    /// Always returns no detections.
    pub fn empty() -> Self {
        Self::fixed(Vec::new())
    }

    /// Returns `detections` on every call.
    pub fn fixed(detections: Vec<Detection>) -> Self {
        Self {
            script: Script::Fixed(detections),
            latency: None,
            jitter: None,
        }
    }

    /// Returns one scripted outcome per call. `Err` entries become detection failures.
    pub fn sequence(outcomes: Vec<Result<Vec<Detection>, String>>) -> Self {
        Self {
            script: Script::Sequence(Mutex::new(outcomes.into())),
            latency: None,
            jitter: None,
        }
    }

    /// Emits `players` person boxes that drift across the frame over time.
    pub fn synthetic(players: usize) -> Self {
        Self {
            script: Script::Synthetic(players),
            latency: None,
            jitter: None,
        }
    }

    /// Delay every call, simulating a slow model.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Perturb scores and box positions with a seeded generator, simulating detector noise.
    /// Scores land anywhere in `JITTER_SCORES`, so some detections fall below the player
    /// threshold.
    pub fn with_jitter(mut self, seed: u64) -> Self {
        self.jitter = Some(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    fn perturb(&self, detections: &mut [Detection]) -> Result<(), ProviderError> {
        let Some(rng) = &self.jitter else {
            return Ok(());
        };
        let mut rng = rng
            .lock()
            .map_err(|_| ProviderError::Detection("jitter lock poisoned".to_string()))?;
        for det in detections {
            det.score = rng.gen_range(JITTER_SCORES);
            det.bbox.x += rng.gen_range(-JITTER_PX..=JITTER_PX);
            det.bbox.y += rng.gen_range(-JITTER_PX..=JITTER_PX);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectDetector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, ProviderError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut detections = self
            .script
            .next(frame, |bbox| Detection::new(PERSON_CLASS, 0.9, *bbox))
            .map_err(ProviderError::Detection)?;
        self.perturb(&mut detections)?;
        Ok(detections)
    }
}

/// Stub pose estimator for tests and the synthetic demo.
pub struct StubPoseEstimator {
    script: Script<Skeleton>,
    latency: Option<Duration>,
}

impl StubPoseEstimator {
    pub fn empty() -> Self {
        Self::fixed(Vec::new())
    }

    pub fn fixed(skeletons: Vec<Skeleton>) -> Self {
        Self {
            script: Script::Fixed(skeletons),
            latency: None,
        }
    }

    pub fn sequence(outcomes: Vec<Result<Vec<Skeleton>, String>>) -> Self {
        Self {
            script: Script::Sequence(Mutex::new(outcomes.into())),
            latency: None,
        }
    }

    /// Emits one upright skeleton per synthetic player box.
    pub fn synthetic(players: usize) -> Self {
        Self {
            script: Script::Synthetic(players),
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait]
impl PoseEstimator for StubPoseEstimator {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn estimate_poses(&self, frame: &Frame) -> Result<Vec<Skeleton>, ProviderError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.script
            .next(frame, upright_skeleton)
            .map_err(ProviderError::Pose)
    }
}

/// Boxes for `count` players spread across the frame, drifting right and wrapping around.
pub fn synthetic_players(frame: &Frame, count: usize) -> Vec<BoundingBox> {
    let (width, height) = (frame.width as f32, frame.height as f32);
    let box_w = (width / 12.0).max(1.0);
    let box_h = (height / 4.0).max(1.0);
    let travel = (width - box_w).max(1.0);
    let drift = frame.timestamp_secs as f32 * SYNTHETIC_DRIFT_PX_PER_SEC;

    (0..count)
        .map(|i| {
            let offset = i as f32 * travel / count as f32;
            let x = (offset + drift) % travel;
            let lane = (i % 3) as f32;
            let y = (height * (0.2 + 0.25 * lane)).min(height - box_h);
            BoundingBox::new(x, y, box_w, box_h)
        })
        .collect()
}

/// A standing skeleton proportioned to `bbox`.
pub fn upright_skeleton(bbox: &BoundingBox) -> Skeleton {
    let (cx, _) = bbox.centroid();
    let at = |fx: f32, fy: f32| (cx + fx * bbox.width, bbox.y + fy * bbox.height);
    let joints: [(&str, f32, f32); 13] = [
        ("nose", 0.0, 0.08),
        ("left_shoulder", -0.3, 0.22),
        ("right_shoulder", 0.3, 0.22),
        ("left_elbow", -0.4, 0.38),
        ("right_elbow", 0.4, 0.38),
        ("left_wrist", -0.42, 0.52),
        ("right_wrist", 0.42, 0.52),
        ("left_hip", -0.18, 0.55),
        ("right_hip", 0.18, 0.55),
        ("left_knee", -0.2, 0.75),
        ("right_knee", 0.2, 0.75),
        ("left_ankle", -0.22, 0.95),
        ("right_ankle", 0.22, 0.95),
    ];
    Skeleton::new(
        joints
            .iter()
            .map(|&(name, fx, fy)| {
                let (x, y) = at(fx, fy);
                Keypoint::new(name, x, y, 0.9)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(t: f64) -> Frame {
        Frame::blank(640, 480, t).unwrap()
    }

    #[tokio::test]
    async fn sequence_plays_outcomes_in_order() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        let detector = StubDetector::sequence(vec![
            Ok(vec![Detection::new("person", 0.9, bbox)]),
            Err("model exploded".into()),
        ]);

        assert_eq!(detector.detect(&frame(0.0)).await.unwrap().len(), 1);
        assert!(matches!(
            detector.detect(&frame(0.1)).await,
            Err(ProviderError::Detection(_))
        ));
        assert!(detector.detect(&frame(0.2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn synthetic_players_stay_inside_frame() {
        let detector = StubDetector::synthetic(4);
        for step in 0..50 {
            let detections = detector.detect(&frame(step as f64 * 0.7)).await.unwrap();
            assert_eq!(detections.len(), 4);
            for det in detections {
                assert!(det.is_player());
                assert!(det.bbox.x >= 0.0 && det.bbox.x + det.bbox.width <= 640.0);
                assert!(det.bbox.y >= 0.0 && det.bbox.bottom() <= 480.0);
            }
        }
    }

    #[tokio::test]
    async fn jitter_is_seeded_and_bounded() {
        let a = StubDetector::synthetic(3).with_jitter(7);
        let b = StubDetector::synthetic(3).with_jitter(7);
        let clean = StubDetector::synthetic(3);
        let f = frame(0.5);

        let (da, db) = (a.detect(&f).await.unwrap(), b.detect(&f).await.unwrap());
        assert_eq!(da, db);
        for (noisy, base) in da.iter().zip(clean.detect(&f).await.unwrap()) {
            assert!(JITTER_SCORES.contains(&noisy.score));
            assert!((noisy.bbox.x - base.bbox.x).abs() <= JITTER_PX);
        }
    }

    #[tokio::test]
    async fn synthetic_skeleton_nose_sits_inside_box() {
        let estimator = StubPoseEstimator::synthetic(1);
        let boxes = synthetic_players(&frame(1.0), 1);
        let skeletons = estimator.estimate_poses(&frame(1.0)).await.unwrap();
        let nose = skeletons[0].keypoint("nose").unwrap();
        let (x, y) = nose.position_above(0.3).unwrap();
        assert!(x >= boxes[0].x && x <= boxes[0].x + boxes[0].width);
        assert!(y >= boxes[0].y && y <= boxes[0].bottom());
    }
}
