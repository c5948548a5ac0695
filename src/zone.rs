//! Lateral zone classification.

use std::fmt;

/// One of three lateral thirds of the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Zone {
    LeftWing,
    Center,
    RightWing,
}

impl Zone {
    pub fn label(self) -> &'static str {
        match self {
            Zone::LeftWing => "Left Wing",
            Zone::Center => "Center",
            Zone::RightWing => "Right Wing",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify `x` against a frame `frame_width` pixels wide. Both boundaries belong to `Center`.
pub fn zone(x: f32, frame_width: f32) -> Zone {
    if x < frame_width / 3.0 {
        Zone::LeftWing
    } else if x > 2.0 * frame_width / 3.0 {
        Zone::RightWing
    } else {
        Zone::Center
    }
}

/// Horizontal distance of `x` from the frame's vertical center line.
pub fn lateral_distance(x: f32, frame_width: f32) -> f32 {
    (x - frame_width / 2.0).abs()
}
