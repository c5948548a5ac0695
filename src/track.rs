//! Track-state store and frame-to-frame kinematics.
//!
//! Identity is approximated by quantising a player's centroid to whole pixels. Each key holds
//! the last observed position and time, overwritten on every sighting and never deleted
//! while the session lives. A player that moves far enough between frames lands on a new
//! key and is treated as a first sighting, which reports zero speed for that frame.
//!
//! The store sits behind [`TrackStore`] so a different re-association strategy can be swapped
//! in without touching fusion or rendering. [`NearestTrackStore`] is one such strategy: it
//! reuses the key of the closest previous sighting within a radius.

use std::collections::{BTreeMap, HashMap};

/// Elapsed time assumed for a first sighting, and the floor for every speed computation.
pub const MIN_ELAPSED_SECS: f64 = 0.1;

/// Last known state of one tracked identity.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackEntry {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub timestamp: f64,
}

/// Keyed position memory used to derive velocity.
pub trait TrackStore {
    /// Identity key for a sighting at `(x, y)`.
    fn key_for(&self, x: f32, y: f32) -> String {
        track_id(x, y)
    }

    fn get(&self, key: &str) -> Option<&TrackEntry>;

    /// Insert or overwrite the entry for `key`.
    fn put(&mut self, key: String, entry: TrackEntry);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Called when the owning session ends.
    fn clear(&mut self);
}

/// Session-owned store keyed by quantised centroid.
#[derive(Debug, Default)]
pub struct QuantizedTrackStore {
    entries: HashMap<String, TrackEntry>,
}

impl QuantizedTrackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrackStore for QuantizedTrackStore {
    fn get(&self, key: &str) -> Option<&TrackEntry> {
        self.entries.get(key)
    }

    fn put(&mut self, key: String, entry: TrackEntry) {
        self.entries.insert(key, entry);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Store that re-associates a sighting with the nearest previous entry within `radius`
/// pixels, falling back to the quantised key when nothing is close enough.
#[derive(Debug)]
pub struct NearestTrackStore {
    entries: BTreeMap<String, TrackEntry>,
    radius: f32,
}

impl NearestTrackStore {
    pub fn new(radius: f32) -> Self {
        Self {
            entries: BTreeMap::new(),
            radius,
        }
    }
}

impl TrackStore for NearestTrackStore {
    fn key_for(&self, x: f32, y: f32) -> String {
        let mut best: Option<(&String, f32)> = None;
        for (key, entry) in &self.entries {
            let dist = (entry.x - x).hypot(entry.y - y);
            if dist <= self.radius && best.map_or(true, |(_, d)| dist < d) {
                best = Some((key, dist));
            }
        }
        match best {
            Some((key, _)) => key.clone(),
            None => track_id(x, y),
        }
    }

    fn get(&self, key: &str) -> Option<&TrackEntry> {
        self.entries.get(key)
    }

    fn put(&mut self, key: String, entry: TrackEntry) {
        self.entries.insert(key, entry);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Identity key for a centroid: both coordinates rounded to whole pixels.
pub fn track_id(x: f32, y: f32) -> String {
    format!("{}-{}", x.round() as i64, y.round() as i64)
}

/// Kinematics derived for one player on one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Kinematics {
    pub id: String,
    /// Pixels per second.
    pub speed: f32,
}

/// Record a sighting at `(x, y)` and return the speed relative to the previous sighting of
/// the same key.
pub fn observe(store: &mut dyn TrackStore, x: f32, y: f32, timestamp: f64) -> Kinematics {
    let id = store.key_for(x, y);
    let (prev_x, prev_y, elapsed) = match store.get(&id) {
        Some(prev) => (prev.x, prev.y, timestamp - prev.timestamp),
        None => (x, y, MIN_ELAPSED_SECS),
    };
    let distance = ((x - prev_x) as f64).hypot((y - prev_y) as f64);
    let speed = (distance / elapsed.max(MIN_ELAPSED_SECS)) as f32;

    store.put(
        id.clone(),
        TrackEntry {
            id: id.clone(),
            x,
            y,
            timestamp,
        },
    );
    Kinematics { id, speed }
}
