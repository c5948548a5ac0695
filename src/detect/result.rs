/// Minimum detector score for a detection to count as a player.
pub const PLAYER_MIN_SCORE: f32 = 0.5;

/// Class label of detections that may become players.
pub const PERSON_CLASS: &str = "person";

/// Axis-aligned box in frame pixels, origin at the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn centroid(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// One scored, classed box from an object detector.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class: String,
    pub score: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: impl Into<String>, score: f32, bbox: BoundingBox) -> Self {
        Self {
            class: class.into(),
            score,
            bbox,
        }
    }

    /// A detection is a player candidate when it is a person scored at or above 0.5.
    pub fn is_player(&self) -> bool {
        self.class == PERSON_CLASS && self.score >= PLAYER_MIN_SCORE
    }
}

/// A named skeletal keypoint. Coordinates are optional because estimators may omit them.
#[derive(Clone, Debug, PartialEq)]
pub struct Keypoint {
    pub name: String,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub score: f32,
}

impl Keypoint {
    pub fn new(name: impl Into<String>, x: f32, y: f32, score: f32) -> Self {
        Self {
            name: name.into(),
            x: Some(x),
            y: Some(y),
            score,
        }
    }

    /// Position if both coordinates are present and the score exceeds `threshold`.
    pub fn position_above(&self, threshold: f32) -> Option<(f32, f32)> {
        if self.score <= threshold {
            return None;
        }
        Some((self.x?, self.y?))
    }
}

/// A set of keypoints estimated for one body.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skeleton {
    pub keypoints: Vec<Keypoint>,
}

impl Skeleton {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    /// First keypoint carrying `name`.
    pub fn keypoint(&self, name: &str) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_filter_requires_person_and_score() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(Detection::new("person", 0.5, bbox).is_player());
        assert!(!Detection::new("person", 0.49, bbox).is_player());
        assert!(!Detection::new("sports ball", 0.99, bbox).is_player());
    }

    #[test]
    fn centroid_is_box_center() {
        let bbox = BoundingBox::new(10.0, 20.0, 50.0, 100.0);
        assert_eq!(bbox.centroid(), (35.0, 70.0));
        assert_eq!(bbox.bottom(), 120.0);
    }

    #[test]
    fn keypoint_position_needs_score_and_coordinates() {
        let kp = Keypoint::new("nose", 3.0, 4.0, 0.6);
        assert_eq!(kp.position_above(0.5), Some((3.0, 4.0)));
        assert_eq!(kp.position_above(0.6), None);

        let missing = Keypoint {
            name: "nose".into(),
            x: Some(3.0),
            y: None,
            score: 0.9,
        };
        assert_eq!(missing.position_above(0.5), None);
    }
}
