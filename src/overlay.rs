//! Overlay rendering.
//!
//! The renderer clears and redraws the whole surface every cycle from that cycle's fused
//! players. Surfaces are pure sinks: nothing reads drawing state back.
//!
//! - `OverlaySurface`: drawing target trait.
//! - `RasterSurface`: transparent RGBA raster, composited over frames for snapshots.
//! - `RecordingSurface`: captures draw commands; used by tests and headless runs.
//! - `OverlayRenderer`: draws boxes, skeletons and annotation text.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;

use crate::detect::{BoundingBox, Skeleton};
use crate::error::RenderError;
use crate::frame::Frame;
use crate::zone::Zone;

/// Keypoints at or below this score are not drawn.
pub const KEYPOINT_MIN_SCORE: f32 = 0.5;

pub const KEYPOINT_RADIUS: f32 = 4.0;

/// Text height in pixels.
pub const TEXT_SCALE: f32 = 14.0;

/// Limb segments drawn between keypoints, mirrored left and right.
pub const SKELETON_PAIRS: [(&str, &str); 12] = [
    ("left_shoulder", "right_shoulder"),
    ("left_shoulder", "left_elbow"),
    ("left_elbow", "left_wrist"),
    ("right_shoulder", "right_elbow"),
    ("right_elbow", "right_wrist"),
    ("left_shoulder", "left_hip"),
    ("right_shoulder", "right_hip"),
    ("left_hip", "right_hip"),
    ("left_hip", "left_knee"),
    ("left_knee", "left_ankle"),
    ("right_hip", "right_knee"),
    ("right_knee", "right_ankle"),
];

/// RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const PLAYER: Color = Color([0, 255, 0, 255]);
    pub const SKELETON: Color = Color([0, 255, 255, 255]);
    pub const ANNOTATION: Color = Color([255, 255, 0, 255]);
    pub const ZONE: Color = Color([238, 130, 238, 255]);
}

/// Drawing target sized to the current frame.
pub trait OverlaySurface {
    fn size(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

    /// Reset every pixel to transparent.
    fn clear(&mut self) -> Result<(), RenderError>;

    fn stroke_rect(&mut self, bbox: &BoundingBox, color: Color) -> Result<(), RenderError>;

    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Color)
        -> Result<(), RenderError>;

    fn line(&mut self, from: (f32, f32), to: (f32, f32), color: Color) -> Result<(), RenderError>;

    /// Draw `text` with its baseline starting at `at`.
    fn text(&mut self, text: &str, at: (f32, f32), color: Color) -> Result<(), RenderError>;
}

/// Everything drawn for one player on one cycle.
#[derive(Clone, Debug)]
pub struct PlayerOverlay<'a> {
    pub bbox: BoundingBox,
    pub skeleton: Option<&'a Skeleton>,
    pub lateral_px: f32,
    pub speed: f32,
    pub zone: Zone,
}

/// Draws a cycle's players onto an [`OverlaySurface`].
#[derive(Clone, Debug, Default)]
pub struct OverlayRenderer;

impl OverlayRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Redraw the whole surface for one frame.
    ///
    /// The surface is resized to `frame_size` first when it differs, then cleared.
    pub fn render(
        &self,
        surface: &mut dyn OverlaySurface,
        frame_size: (u32, u32),
        players: &[PlayerOverlay<'_>],
    ) -> Result<(), RenderError> {
        if surface.size() != frame_size {
            surface.resize(frame_size.0, frame_size.1)?;
        }
        surface.clear()?;

        for player in players {
            let bbox = &player.bbox;
            surface.stroke_rect(bbox, Color::PLAYER)?;
            surface.text("player", (bbox.x, bbox.y - 6.0), Color::PLAYER)?;

            if let Some(skeleton) = player.skeleton {
                self.draw_skeleton(surface, skeleton)?;
            }

            let below = bbox.bottom();
            surface.text(
                &format!("{:.1} px", player.lateral_px),
                (bbox.x, below + 12.0),
                Color::ANNOTATION,
            )?;
            surface.text(
                &format!("{:.1} px/s", player.speed),
                (bbox.x, below + 26.0),
                Color::ANNOTATION,
            )?;
            surface.text(player.zone.label(), (bbox.x, below + 40.0), Color::ZONE)?;
        }
        Ok(())
    }

    fn draw_skeleton(
        &self,
        surface: &mut dyn OverlaySurface,
        skeleton: &Skeleton,
    ) -> Result<(), RenderError> {
        for kp in &skeleton.keypoints {
            if let Some(center) = kp.position_above(KEYPOINT_MIN_SCORE) {
                surface.fill_circle(center, KEYPOINT_RADIUS, Color::SKELETON)?;
            }
        }
        for (a, b) in SKELETON_PAIRS {
            let from = skeleton
                .keypoint(a)
                .and_then(|kp| kp.position_above(KEYPOINT_MIN_SCORE));
            let to = skeleton
                .keypoint(b)
                .and_then(|kp| kp.position_above(KEYPOINT_MIN_SCORE));
            if let (Some(from), Some(to)) = (from, to) {
                surface.line(from, to, Color::SKELETON)?;
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// RasterSurface
// ----------------------------------------------------------------------------

/// Transparent RGBA raster overlay.
///
/// Text is only drawn when a font has been loaded; without one, labels are skipped.
pub struct RasterSurface {
    canvas: RgbaImage,
    font: Option<FontVec>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
            font: None,
        }
    }

    /// Load a TrueType/OpenType font for annotation text.
    pub fn with_font_file(mut self, path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| anyhow!("{} is not a usable font", path.display()))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Blend the overlay over `frame`. The frame must match the overlay size.
    pub fn composite(&self, frame: &Frame) -> Result<RgbImage> {
        if frame.dimensions() != self.canvas.dimensions() {
            return Err(anyhow!(
                "overlay is {:?} but frame is {:?}",
                self.canvas.dimensions(),
                frame.dimensions()
            ));
        }
        let mut out = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        for (x, y, px) in self.canvas.enumerate_pixels() {
            let alpha = px[3] as u16;
            if alpha == 0 {
                continue;
            }
            let base = out.get_pixel(x, y);
            let mut blended = [0u8; 3];
            for c in 0..3 {
                blended[c] =
                    ((px[c] as u16 * alpha + base[c] as u16 * (255 - alpha)) / 255) as u8;
            }
            out.put_pixel(x, y, Rgb(blended));
        }
        Ok(out)
    }

    /// Write the overlay composited over `frame` to `path` (format from the extension).
    pub fn save_snapshot(&self, frame: &Frame, path: &Path) -> Result<()> {
        self.composite(frame)?
            .save(path)
            .with_context(|| format!("write overlay snapshot {}", path.display()))
    }
}

impl OverlaySurface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError(format!("cannot size overlay to {width}x{height}")));
        }
        self.canvas = RgbaImage::new(width, height);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RenderError> {
        self.canvas.pixels_mut().for_each(|px| *px = Rgba([0, 0, 0, 0]));
        Ok(())
    }

    fn stroke_rect(&mut self, bbox: &BoundingBox, color: Color) -> Result<(), RenderError> {
        if !(bbox.x.is_finite() && bbox.y.is_finite()) {
            return Err(RenderError(format!("non-finite box {bbox:?}")));
        }
        let rect = Rect::at(bbox.x.round() as i32, bbox.y.round() as i32)
            .of_size(bbox.width.round().max(1.0) as u32, bbox.height.round().max(1.0) as u32);
        draw_hollow_rect_mut(&mut self.canvas, rect, Rgba(color.0));
        Ok(())
    }

    fn fill_circle(
        &mut self,
        center: (f32, f32),
        radius: f32,
        color: Color,
    ) -> Result<(), RenderError> {
        draw_filled_circle_mut(
            &mut self.canvas,
            (center.0.round() as i32, center.1.round() as i32),
            radius.round() as i32,
            Rgba(color.0),
        );
        Ok(())
    }

    fn line(&mut self, from: (f32, f32), to: (f32, f32), color: Color) -> Result<(), RenderError> {
        draw_line_segment_mut(&mut self.canvas, from, to, Rgba(color.0));
        Ok(())
    }

    fn text(&mut self, text: &str, at: (f32, f32), color: Color) -> Result<(), RenderError> {
        let Some(font) = &self.font else {
            return Ok(());
        };
        // imageproc positions text by its top edge.
        let top = (at.1 - TEXT_SCALE).round() as i32;
        draw_text_mut(
            &mut self.canvas,
            Rgba(color.0),
            at.0.round() as i32,
            top,
            PxScale::from(TEXT_SCALE),
            font,
            text,
        );
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// RecordingSurface
// ----------------------------------------------------------------------------

/// A draw command captured by [`RecordingSurface`].
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Resize(u32, u32),
    Clear,
    Rect(BoundingBox, Color),
    Circle((f32, f32), f32, Color),
    Line((f32, f32), (f32, f32), Color),
    Text(String, (f32, f32), Color),
}

/// Surface that records the commands of the most recent cycle.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    size: (u32, u32),
    commands: Vec<DrawCommand>,
    fail_draws: bool,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every drawing primitive fail, for exercising render-failure handling.
    pub fn failing() -> Self {
        Self {
            fail_draws: true,
            ..Self::default()
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Commands that put pixels on the surface (everything but resize and clear).
    pub fn draw_calls(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| !matches!(c, DrawCommand::Resize(..) | DrawCommand::Clear))
            .count()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text(text, _, _) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn record(&mut self, command: DrawCommand) -> Result<(), RenderError> {
        if self.fail_draws {
            return Err(RenderError(format!("surface rejected {command:?}")));
        }
        self.commands.push(command);
        Ok(())
    }
}

impl OverlaySurface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.size = (width, height);
        self.commands.push(DrawCommand::Resize(width, height));
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RenderError> {
        self.commands.retain(|c| matches!(c, DrawCommand::Resize(..)));
        self.commands.push(DrawCommand::Clear);
        Ok(())
    }

    fn stroke_rect(&mut self, bbox: &BoundingBox, color: Color) -> Result<(), RenderError> {
        self.record(DrawCommand::Rect(*bbox, color))
    }

    fn fill_circle(
        &mut self,
        center: (f32, f32),
        radius: f32,
        color: Color,
    ) -> Result<(), RenderError> {
        self.record(DrawCommand::Circle(center, radius, color))
    }

    fn line(&mut self, from: (f32, f32), to: (f32, f32), color: Color) -> Result<(), RenderError> {
        self.record(DrawCommand::Line(from, to, color))
    }

    fn text(&mut self, text: &str, at: (f32, f32), color: Color) -> Result<(), RenderError> {
        self.record(DrawCommand::Text(text.to_string(), at, color))
    }
}
