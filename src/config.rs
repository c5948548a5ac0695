use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::ProviderSettings;
use crate::ingest::{CameraConfig, FacingMode, FileConfig, MediaMetadata};
use crate::session::SessionConfig;

const DEFAULT_INTERVAL_MS: u64 = 100;
const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PROVIDER: &str = "stub";
const DEFAULT_SOURCE_PATH: &str = "stub://match";
const DEFAULT_FRONT_DEVICE: &str = "/dev/video0";
const DEFAULT_BACK_DEVICE: &str = "/dev/video1";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 10;
const DEFAULT_DURATION_SECS: f64 = 30.0;
/// Square input size of single-pose models such as MoveNet Lightning.
const POSE_INPUT_SIZE: u32 = 192;

#[derive(Debug, Deserialize, Default)]
struct AnalyticaConfigFile {
    sampling: Option<SamplingConfigFile>,
    providers: Option<ProvidersConfigFile>,
    source: Option<SourceConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ProvidersConfigFile {
    ready_timeout_ms: Option<u64>,
    call_timeout_ms: Option<u64>,
    detector: Option<String>,
    pose: Option<String>,
    detector_model: Option<PathBuf>,
    pose_model: Option<PathBuf>,
    synthetic_players: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    kind: Option<String>,
    path: Option<String>,
    facing: Option<String>,
    front_device: Option<String>,
    back_device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    duration_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    font_path: Option<PathBuf>,
    snapshot_path: Option<PathBuf>,
}

/// Which kind of frame source a session reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Camera,
}

impl SourceKind {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(SourceKind::File),
            "camera" => Ok(SourceKind::Camera),
            other => Err(anyhow!("source kind must be file or camera, got {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyticaConfig {
    pub interval: Duration,
    pub providers: ProviderConfig,
    pub source: SourceSettings,
    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub ready_timeout: Duration,
    /// `None` means one sampling interval.
    pub call_timeout: Option<Duration>,
    pub detector: String,
    pub pose: String,
    pub detector_model: Option<PathBuf>,
    pub pose_model: Option<PathBuf>,
    pub synthetic_players: usize,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub kind: SourceKind,
    pub path: String,
    pub facing: FacingMode,
    pub front_device: String,
    pub back_device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Default)]
pub struct OverlaySettings {
    pub font_path: Option<PathBuf>,
    pub snapshot_path: Option<PathBuf>,
}

impl AnalyticaConfig {
    /// Defaults, overlaid by the file named in `ANALYTICA_CONFIG`, overlaid by environment.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ANALYTICA_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like [`AnalyticaConfig::load`] with an explicit config file.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AnalyticaConfigFile) -> Result<Self> {
        let interval = Duration::from_millis(
            file.sampling
                .and_then(|sampling| sampling.interval_ms)
                .unwrap_or(DEFAULT_INTERVAL_MS),
        );

        let providers_file = file.providers.unwrap_or_default();
        let providers = ProviderConfig {
            ready_timeout: Duration::from_millis(
                providers_file
                    .ready_timeout_ms
                    .unwrap_or(DEFAULT_READY_TIMEOUT_MS),
            ),
            call_timeout: providers_file.call_timeout_ms.map(Duration::from_millis),
            detector: providers_file
                .detector
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            pose: providers_file
                .pose
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            detector_model: providers_file.detector_model,
            pose_model: providers_file.pose_model,
            synthetic_players: providers_file
                .synthetic_players
                .unwrap_or_else(|| ProviderSettings::default().synthetic_players),
        };

        let source_file = file.source.unwrap_or_default();
        let source = SourceSettings {
            kind: match source_file.kind.as_deref() {
                Some(kind) => SourceKind::parse(kind)?,
                None => SourceKind::File,
            },
            path: source_file
                .path
                .unwrap_or_else(|| DEFAULT_SOURCE_PATH.to_string()),
            facing: match source_file.facing.as_deref() {
                Some(facing) => facing.parse()?,
                None => FacingMode::Front,
            },
            front_device: source_file
                .front_device
                .unwrap_or_else(|| DEFAULT_FRONT_DEVICE.to_string()),
            back_device: source_file
                .back_device
                .unwrap_or_else(|| DEFAULT_BACK_DEVICE.to_string()),
            width: source_file.width.unwrap_or(DEFAULT_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_HEIGHT),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_FPS),
            duration_secs: source_file.duration_secs.unwrap_or(DEFAULT_DURATION_SECS),
        };

        let overlay = file
            .overlay
            .map(|overlay| OverlaySettings {
                font_path: overlay.font_path,
                snapshot_path: overlay.snapshot_path,
            })
            .unwrap_or_default();

        Ok(Self {
            interval,
            providers,
            source,
            overlay,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(ms) = env_millis("ANALYTICA_INTERVAL_MS")? {
            self.interval = ms;
        }
        if let Some(ms) = env_millis("ANALYTICA_READY_TIMEOUT_MS")? {
            self.providers.ready_timeout = ms;
        }
        if let Some(ms) = env_millis("ANALYTICA_CALL_TIMEOUT_MS")? {
            self.providers.call_timeout = Some(ms);
        }
        if let Some(detector) = env_nonempty("ANALYTICA_DETECTOR") {
            self.providers.detector = detector;
        }
        if let Some(pose) = env_nonempty("ANALYTICA_POSE") {
            self.providers.pose = pose;
        }
        if let Some(kind) = env_nonempty("ANALYTICA_SOURCE") {
            self.source.kind = SourceKind::parse(&kind)?;
        }
        if let Some(path) = env_nonempty("ANALYTICA_SOURCE_PATH") {
            self.source.path = path;
        }
        if let Some(facing) = env_nonempty("ANALYTICA_FACING") {
            self.source.facing = facing.parse()?;
        }
        if let Some(font) = env_nonempty("ANALYTICA_FONT") {
            self.overlay.font_path = Some(PathBuf::from(font));
        }
        if let Some(snapshot) = env_nonempty("ANALYTICA_SNAPSHOT") {
            self.overlay.snapshot_path = Some(PathBuf::from(snapshot));
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(anyhow!("sampling interval must be greater than zero"));
        }
        if self.providers.ready_timeout.is_zero() {
            return Err(anyhow!("provider ready timeout must be greater than zero"));
        }
        if self.providers.call_timeout.is_some_and(|t| t.is_zero()) {
            return Err(anyhow!("provider call timeout must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be non-zero"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        if !(self.source.duration_secs.is_finite() && self.source.duration_secs > 0.0) {
            return Err(anyhow!("source duration_secs must be a positive number"));
        }
        if self.source.kind == SourceKind::File && self.source.path.trim().is_empty() {
            return Err(anyhow!("file source requires a path"));
        }
        Ok(())
    }

    /// Provider call timeout, defaulting to one sampling interval.
    pub fn call_timeout(&self) -> Duration {
        self.providers.call_timeout.unwrap_or(self.interval)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            interval: self.interval,
            ready_timeout: self.providers.ready_timeout,
            call_timeout: self.call_timeout(),
        }
    }

    pub fn file_config(&self) -> FileConfig {
        FileConfig::new(self.source.path.clone())
            .with_metadata(MediaMetadata {
                duration_secs: self.source.duration_secs,
                avg_fps: f64::from(self.source.target_fps),
                width: self.source.width,
                height: self.source.height,
            })
            .with_sample_interval(self.interval)
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            facing: self.source.facing,
            front_device: self.source.front_device.clone(),
            back_device: self.source.back_device.clone(),
            target_fps: self.source.target_fps,
            width: self.source.width,
            height: self.source.height,
        }
    }

    pub fn detector_settings(&self) -> ProviderSettings {
        ProviderSettings {
            model_path: self.providers.detector_model.clone(),
            synthetic_players: self.providers.synthetic_players,
            ..ProviderSettings::default()
        }
    }

    pub fn pose_settings(&self) -> ProviderSettings {
        ProviderSettings {
            model_path: self.providers.pose_model.clone(),
            input_width: POSE_INPUT_SIZE,
            input_height: POSE_INPUT_SIZE,
            synthetic_players: self.providers.synthetic_players,
        }
    }
}

fn read_config_file(path: &Path) -> Result<AnalyticaConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn env_millis(key: &str) -> Result<Option<Duration>> {
    match env_nonempty(key) {
        Some(value) => {
            let ms: u64 = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("{key} must be an integer number of milliseconds"))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        None => Ok(None),
    }
}
