//! Frame container.
//!
//! A `Frame` is an immutable RGB raster with a capture timestamp. Frames are produced by
//! the ingestion layer, handed to the capability providers and the overlay renderer for a
//! single processing cycle, and dropped when the cycle ends. Nothing downstream keeps one.

use std::sync::Arc;

use anyhow::{anyhow, Result};

/// Bytes per pixel for the packed RGB layout every source produces.
pub const RGB_CHANNELS: usize = 3;

/// Immutable timestamped RGB raster.
///
/// Pixel storage is shared, so cloning a frame is cheap. There is no mutable access to the
/// pixels once the frame exists.
#[derive(Clone)]
pub struct Frame {
    pixels: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Media time of the frame in seconds (stream position for files, time since connect
    /// for capture devices).
    pub timestamp_secs: f64,
}

impl Frame {
    /// Create a frame from packed RGB bytes.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, timestamp_secs: f64) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        if !timestamp_secs.is_finite() || timestamp_secs < 0.0 {
            return Err(anyhow!("frame timestamp must be a non-negative finite number"));
        }
        Ok(Self {
            pixels: pixels.into(),
            width,
            height,
            timestamp_secs,
        })
    }

    /// A black frame, used by synthetic sources and tests.
    pub fn blank(width: u32, height: u32, timestamp_secs: f64) -> Result<Self> {
        let len = expected_len(width, height)?;
        Self::new(vec![0u8; len], width, height, timestamp_secs)
    }

    /// Read-only pixel access for inference and compositing.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp_secs", &self.timestamp_secs)
            .finish_non_exhaustive()
    }
}

fn expected_len(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(anyhow!("frame dimensions must be non-zero"));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_wrong_pixel_count() {
        assert!(Frame::new(vec![0u8; 10], 4, 4, 0.0).is_err());
        assert!(Frame::new(vec![0u8; 48], 4, 4, 0.0).is_ok());
    }

    #[test]
    fn frame_rejects_zero_dimensions() {
        assert!(Frame::blank(0, 480, 0.0).is_err());
    }

    #[test]
    fn frame_rejects_negative_timestamp() {
        assert!(Frame::blank(2, 2, -1.0).is_err());
        assert!(Frame::blank(2, 2, f64::NAN).is_err());
    }

    #[test]
    fn clones_share_pixels() {
        let frame = Frame::new(vec![7u8; 12], 2, 2, 1.5).unwrap();
        let copy = frame.clone();
        assert_eq!(copy.pixels(), frame.pixels());
        assert_eq!(copy.dimensions(), (2, 2));
        assert_eq!(copy.timestamp_secs, 1.5);
    }
}
