//! File-backed frame source.
//!
//! `FileSource` plays a local video file from the beginning to the end, once. Frame
//! timestamps are stream positions (`index / avg_fps`), not wall-clock time.
//!
//! Decoded frames are sampled at the session cadence: each call hands out the first frame
//! whose stream position reaches the next sampling point, so consecutive frames are about
//! one sampling interval of media apart whatever the file's frame rate.
//!
//! The source MUST NOT:
//! - Fetch remote URLs
//! - Loop back to the start when the file ends
//! - Retain frames after handing them out

use std::time::Duration;

use super::synthetic::pitch_pixels;
use super::{toggle_pause, FrameSource, SourceState, SourceStats, STUB_SCHEME};
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use crate::error::SourceError;
use crate::frame::Frame;
use crate::session::DEFAULT_INTERVAL;

/// Tolerance on stream positions, absorbing rounding in `index / fps`.
const SAMPLE_EPSILON_SECS: f64 = 1e-6;

/// Coarse media metadata reported by the upload pipeline or probed from the file.
///
/// Only used to size the source; analysis never depends on the exact values.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaMetadata {
    pub duration_secs: f64,
    pub avg_fps: f64,
    pub width: u32,
    pub height: u32,
}

impl MediaMetadata {
    /// Number of frames the metadata describes, rounded down.
    pub fn frame_count(&self) -> u64 {
        if self.avg_fps <= 0.0 || self.duration_secs <= 0.0 {
            return 0;
        }
        (self.duration_secs * self.avg_fps).floor() as u64
    }

    /// Stream position of frame `index`.
    pub fn timestamp_of(&self, index: u64) -> f64 {
        if self.avg_fps <= 0.0 {
            return 0.0;
        }
        index as f64 / self.avg_fps
    }
}

impl Default for MediaMetadata {
    fn default() -> Self {
        Self {
            duration_secs: 30.0,
            avg_fps: 10.0,
            width: 640,
            height: 480,
        }
    }
}

/// Configuration for a file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path, or `stub://<name>` for synthetic playback.
    pub path: String,
    /// Metadata used for synthetic playback; real files report their own.
    pub metadata: MediaMetadata,
    /// Media time between handed-out frames. Zero hands out every decoded frame.
    pub sample_interval: Duration,
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            metadata: MediaMetadata::default(),
            sample_interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }
}

/// Picks which decoded frames a file source hands out.
///
/// Sampling points sit on a fixed grid (`first + k * interval`) so a frame rate that does
/// not divide the interval evenly still averages one interval per frame. When frames are
/// sparser than the grid every frame is due and the grid restarts from the last one.
#[derive(Clone, Debug)]
pub(crate) struct SampleClock {
    interval_secs: f64,
    next_due: Option<f64>,
}

impl SampleClock {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval_secs: interval.as_secs_f64(),
            next_due: None,
        }
    }

    /// Whether the frame at stream position `timestamp` should be handed out.
    pub(crate) fn admit(&mut self, timestamp: f64) -> bool {
        let due = match self.next_due {
            Some(due) if timestamp + SAMPLE_EPSILON_SECS < due => return false,
            Some(due) => due,
            None => timestamp,
        };
        let next = due + self.interval_secs;
        self.next_due = Some(if timestamp + SAMPLE_EPSILON_SECS >= next {
            timestamp + self.interval_secs
        } else {
            next
        });
        true
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self, SourceError> {
        if !is_local_file_path(&config.path) {
            return Err(SourceError::Open {
                path: config.path,
                reason: "only local paths are supported (no URL schemes)".to_string(),
            });
        }
        if config.path.starts_with(STUB_SCHEME) {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(config)),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(SourceError::Open {
                    path: config.path,
                    reason: "file decoding requires the ingest-file-ffmpeg feature".to_string(),
                })
            }
        }
    }

    /// Metadata of the opened media. Real files report probed values once connected.
    pub fn metadata(&self) -> &MediaMetadata {
        match &self.backend {
            FileBackend::Synthetic(source) => &source.config.metadata,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.metadata(),
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<(), SourceError> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn state(&self) -> SourceState {
        match &self.backend {
            FileBackend::Synthetic(source) => source.state,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.state(),
        }
    }

    fn set_paused(&mut self, paused: bool) {
        match &mut self.backend {
            FileBackend::Synthetic(source) => toggle_pause(&mut source.state, paused),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.set_paused(paused),
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.release(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.release(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    clock: SampleClock,
    config: FileConfig,
    frame_index: u64,
    state: SourceState,
}

impl SyntheticFileSource {
    fn new(config: FileConfig) -> Self {
        Self {
            clock: SampleClock::new(config.sample_interval),
            config,
            frame_index: 0,
            state: SourceState::Idle,
        }
    }

    fn connect(&mut self) -> Result<(), SourceError> {
        let meta = &self.config.metadata;
        if meta.width == 0 || meta.height == 0 || meta.avg_fps <= 0.0 {
            return Err(SourceError::Open {
                path: self.config.path.clone(),
                reason: format!("unusable metadata {meta:?}"),
            });
        }
        self.state = SourceState::Streaming;
        log::info!(
            "FileSource: connected to {} (synthetic, {} frames)",
            self.config.path,
            meta.frame_count()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        match self.state {
            SourceState::Streaming | SourceState::Paused => {}
            SourceState::Ended | SourceState::Released => return Err(SourceError::EndOfStream),
            SourceState::Idle => {
                return Err(SourceError::Decode("file source not connected".to_string()))
            }
        }
        let meta = &self.config.metadata;
        let frame_count = meta.frame_count();
        while self.frame_index < frame_count {
            let index = self.frame_index;
            let timestamp = meta.timestamp_of(index);
            self.frame_index += 1;
            if !self.clock.admit(timestamp) {
                continue;
            }
            let pixels = pitch_pixels(meta.width, meta.height, index);
            return Frame::new(pixels, meta.width, meta.height, timestamp)
                .map_err(|err| SourceError::Decode(err.to_string()));
        }
        self.state = SourceState::Ended;
        Err(SourceError::EndOfStream)
    }

    fn release(&mut self) {
        if self.state != SourceState::Released {
            log::info!("FileSource: released {}", self.config.path);
        }
        self.state = SourceState::Released;
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_index,
            origin: self.config.path.clone(),
            state: self.state,
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with(STUB_SCHEME) {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_clip() -> FileConfig {
        FileConfig::new("stub://clip").with_metadata(MediaMetadata {
            duration_secs: 0.3,
            avg_fps: 10.0,
            width: 32,
            height: 24,
        })
    }

    #[test]
    fn rejects_remote_urls() {
        assert!(matches!(
            FileSource::new(FileConfig::new("https://example.com/match.mp4")),
            Err(SourceError::Open { .. })
        ));
        assert!(FileSource::new(FileConfig::new("   ")).is_err());
    }

    #[test]
    fn plays_once_with_stream_timestamps() -> anyhow::Result<()> {
        let mut source = FileSource::new(short_clip())?;
        source.connect()?;

        let stamps: Vec<f64> = (0..3)
            .map(|_| source.next_frame().map(|f| f.timestamp_secs))
            .collect::<Result<_, _>>()?;
        assert_eq!(stamps.len(), 3);
        assert!((stamps[1] - 0.1).abs() < 1e-9);
        assert!((stamps[2] - 0.2).abs() < 1e-9);

        assert!(matches!(source.next_frame(), Err(SourceError::EndOfStream)));
        assert!(source.is_ended());
        // Still ended: no looping back to the start.
        assert!(matches!(source.next_frame(), Err(SourceError::EndOfStream)));
        Ok(())
    }

    #[test]
    fn fast_clip_is_sampled_at_the_interval() -> anyhow::Result<()> {
        let config = FileConfig::new("stub://broadcast")
            .with_metadata(MediaMetadata {
                duration_secs: 1.0,
                avg_fps: 30.0,
                width: 32,
                height: 24,
            })
            .with_sample_interval(Duration::from_millis(100));
        let mut source = FileSource::new(config)?;
        source.connect()?;

        let mut stamps = Vec::new();
        loop {
            match source.next_frame() {
                Ok(frame) => stamps.push(frame.timestamp_secs),
                Err(SourceError::EndOfStream) => break,
                Err(err) => return Err(err.into()),
            }
        }
        assert_eq!(stamps.len(), 10);
        for (i, stamp) in stamps.iter().enumerate() {
            assert!((stamp - i as f64 * 0.1).abs() < 1e-6, "frame {i} at {stamp}");
        }
        assert_eq!(source.stats().frames_captured, 30);
        Ok(())
    }

    #[test]
    fn sample_clock_keeps_an_even_grid() {
        // 25 fps does not divide 100 ms: frames land on the nearest decoded position.
        let mut clock = SampleClock::new(Duration::from_millis(100));
        let admitted: Vec<f64> = (0..25)
            .map(|i| f64::from(i) / 25.0)
            .filter(|&t| clock.admit(t))
            .collect();
        assert_eq!(admitted.len(), 10);
        let expected = [0.0, 0.12, 0.2, 0.32, 0.4, 0.52, 0.6, 0.72, 0.8, 0.92];
        for (got, want) in admitted.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }

        // Sparse frames are all admitted.
        let mut clock = SampleClock::new(Duration::from_millis(100));
        assert!((0..4).all(|i| clock.admit(f64::from(i))));

        // A zero interval admits every frame.
        let mut clock = SampleClock::new(Duration::ZERO);
        assert!((0..4).all(|i| clock.admit(f64::from(i) / 30.0)));
    }

    #[test]
    fn frames_match_metadata_size() -> anyhow::Result<()> {
        let mut source = FileSource::new(short_clip())?;
        source.connect()?;
        let frame = source.next_frame()?;
        assert_eq!(frame.dimensions(), (32, 24));
        assert_eq!(source.metadata().frame_count(), 3);
        Ok(())
    }

    #[test]
    fn pause_and_release() -> anyhow::Result<()> {
        let mut source = FileSource::new(short_clip())?;
        assert!(matches!(source.next_frame(), Err(SourceError::Decode(_))));
        source.connect()?;
        source.set_paused(true);
        assert!(source.is_paused());
        source.set_paused(false);
        assert_eq!(source.state(), SourceState::Streaming);

        source.release();
        source.release();
        assert_eq!(source.stats().state, SourceState::Released);
        assert!(source.is_ended());
        Ok(())
    }
}
