//! Per-frame association of detected players with estimated skeletons.
//!
//! Each player box is paired with the skeleton whose nose lies closest to the box centroid.
//! Assignment is greedy and per detection: one skeleton may be chosen by several boxes.
//! Nothing carries over between frames.

use crate::detect::{Detection, Skeleton};

/// Minimum nose score for a skeleton to be considered for a detection.
pub const NOSE_MIN_SCORE: f32 = 0.3;

/// Keypoint used as the anchor when matching skeletons to boxes.
pub const ANCHOR_KEYPOINT: &str = "nose";

/// A player detection and the skeleton matched to it, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct FusedPlayer<'a> {
    pub detection: &'a Detection,
    pub skeleton: Option<&'a Skeleton>,
}

impl FusedPlayer<'_> {
    pub fn centroid(&self) -> (f32, f32) {
        self.detection.bbox.centroid()
    }
}

/// Keep only player detections (class `person`, score at least 0.5).
pub fn players(detections: &[Detection]) -> Vec<&Detection> {
    detections.iter().filter(|d| d.is_player()).collect()
}

/// Pair every player detection with its nearest skeleton.
pub fn fuse<'a>(detections: &'a [Detection], skeletons: &'a [Skeleton]) -> Vec<FusedPlayer<'a>> {
    players(detections)
        .into_iter()
        .map(|detection| FusedPlayer {
            detection,
            skeleton: nearest_skeleton(detection.bbox.centroid(), skeletons),
        })
        .collect()
}

/// Skeleton whose anchor keypoint is nearest to `point`. Ties keep the earliest skeleton.
pub fn nearest_skeleton(point: (f32, f32), skeletons: &[Skeleton]) -> Option<&Skeleton> {
    let mut best: Option<(&Skeleton, f32)> = None;
    for skeleton in skeletons {
        let Some(anchor) = anchor_position(skeleton) else {
            continue;
        };
        let dist = (anchor.0 - point.0).hypot(anchor.1 - point.1);
        if best.map_or(true, |(_, best_dist)| dist < best_dist) {
            best = Some((skeleton, dist));
        }
    }
    best.map(|(skeleton, _)| skeleton)
}

fn anchor_position(skeleton: &Skeleton) -> Option<(f32, f32)> {
    skeleton
        .keypoint(ANCHOR_KEYPOINT)?
        .position_above(NOSE_MIN_SCORE)
}
