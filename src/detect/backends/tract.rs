#![cfg(feature = "backend-tract")]

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::{imageops, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::{ObjectDetector, PoseEstimator};
use crate::detect::result::{BoundingBox, Detection, Keypoint, Skeleton, PERSON_CLASS};
use crate::error::ProviderError;
use crate::frame::Frame;

type Plan = TypedRunnableModel<TypedModel>;

/// Keypoint order emitted by single-pose MoveNet-style models.
pub const MOVENET_KEYPOINTS: [&str; 17] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// Tract-based object detector.
///
/// Expects an ONNX model taking `[1, 3, H, W]` RGB in `0..1` and producing `[1, N, 6]` rows of
/// `(x1, y1, x2, y2, score, class_id)` in input pixels. Class 0 is `person`.
pub struct TractDetector {
    plan: Arc<Plan>,
    width: u32,
    height: u32,
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let plan = load_plan(model_path.as_ref(), tvec!(1, 3, height as usize, width as usize))?;
        Ok(Self {
            plan: Arc::new(plan),
            width,
            height,
        })
    }
}

#[async_trait]
impl ObjectDetector for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, ProviderError> {
        let plan = self.plan.clone();
        let frame = frame.clone();
        let (width, height) = (self.width, self.height);
        tokio::task::spawn_blocking(move || run_detector(&plan, &frame, width, height))
            .await
            .map_err(|e| ProviderError::Detection(format!("inference task failed: {e}")))?
            .map_err(|e| ProviderError::Detection(format!("{e:#}")))
    }
}

/// Tract-based single-pose estimator.
///
/// Expects an NHWC `[1, S, S, 3]` float input in `0..255` and a `[1, 1, 17, 3]` output of
/// `(y, x, score)` normalised to the input.
pub struct TractPoseEstimator {
    plan: Arc<Plan>,
    size: u32,
}

impl TractPoseEstimator {
    pub fn load<P: AsRef<Path>>(model_path: P, size: u32) -> Result<Self> {
        let plan = load_plan(model_path.as_ref(), tvec!(1, size as usize, size as usize, 3))?;
        Ok(Self {
            plan: Arc::new(plan),
            size,
        })
    }
}

#[async_trait]
impl PoseEstimator for TractPoseEstimator {
    fn name(&self) -> &'static str {
        "tract"
    }

    async fn estimate_poses(&self, frame: &Frame) -> Result<Vec<Skeleton>, ProviderError> {
        let plan = self.plan.clone();
        let frame = frame.clone();
        let size = self.size;
        tokio::task::spawn_blocking(move || run_pose(&plan, &frame, size))
            .await
            .map_err(|e| ProviderError::Pose(format!("inference task failed: {e}")))?
            .map_err(|e| ProviderError::Pose(format!("{e:#}")))
    }
}

fn load_plan(model_path: &Path, shape: TVec<usize>) -> Result<Plan> {
    tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}

fn resized(frame: &Frame, width: u32, height: u32) -> Result<RgbImage> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
        .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
    if frame.width == width && frame.height == height {
        return Ok(image);
    }
    Ok(imageops::resize(
        &image,
        width,
        height,
        imageops::FilterType::Triangle,
    ))
}

fn run_detector(plan: &Plan, frame: &Frame, width: u32, height: u32) -> Result<Vec<Detection>> {
    let image = resized(frame, width, height)?;
    let input = tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, channel, y, x)| image.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
    );
    let outputs = plan
        .run(tvec!(input.into_tensor().into()))
        .context("ONNX inference failed")?;
    let output = outputs
        .first()
        .ok_or_else(|| anyhow!("model produced no outputs"))?;
    let rows = output
        .to_array_view::<f32>()
        .context("model output tensor was not f32")?;
    let rows = rows
        .into_shape_with_order((rows.len() / 6, 6))
        .context("detector output is not a list of 6-value rows")?;

    let sx = frame.width as f32 / width as f32;
    let sy = frame.height as f32 / height as f32;
    Ok(rows
        .outer_iter()
        .map(|row| {
            let class = match row[5].round() as i64 {
                0 => PERSON_CLASS.to_string(),
                other => format!("class{other}"),
            };
            let bbox = BoundingBox::new(
                row[0] * sx,
                row[1] * sy,
                (row[2] - row[0]) * sx,
                (row[3] - row[1]) * sy,
            );
            Detection::new(class, row[4], bbox)
        })
        .collect())
}

fn run_pose(plan: &Plan, frame: &Frame, size: u32) -> Result<Vec<Skeleton>> {
    let image = resized(frame, size, size)?;
    let input = tract_ndarray::Array4::from_shape_fn(
        (1, size as usize, size as usize, 3),
        |(_, y, x, channel)| image.get_pixel(x as u32, y as u32)[channel] as f32,
    );
    let outputs = plan
        .run(tvec!(input.into_tensor().into()))
        .context("ONNX inference failed")?;
    let output = outputs
        .first()
        .ok_or_else(|| anyhow!("model produced no outputs"))?;
    let values = output
        .to_array_view::<f32>()
        .context("model output tensor was not f32")?;
    let values: Vec<f32> = values.iter().copied().collect();
    if values.len() != MOVENET_KEYPOINTS.len() * 3 {
        return Err(anyhow!(
            "expected {} pose values, received {}",
            MOVENET_KEYPOINTS.len() * 3,
            values.len()
        ));
    }

    let keypoints = MOVENET_KEYPOINTS
        .iter()
        .zip(values.chunks_exact(3))
        .map(|(name, v)| {
            Keypoint::new(
                *name,
                v[1] * frame.width as f32,
                v[0] * frame.height as f32,
                v[2],
            )
        })
        .collect();
    Ok(vec![Skeleton::new(keypoints)])
}
