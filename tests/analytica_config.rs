use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use pitch_analytica::config::AnalyticaConfig;
use pitch_analytica::{FacingMode, SourceKind};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ANALYTICA_CONFIG",
        "ANALYTICA_INTERVAL_MS",
        "ANALYTICA_READY_TIMEOUT_MS",
        "ANALYTICA_CALL_TIMEOUT_MS",
        "ANALYTICA_DETECTOR",
        "ANALYTICA_POSE",
        "ANALYTICA_SOURCE",
        "ANALYTICA_SOURCE_PATH",
        "ANALYTICA_FACING",
        "ANALYTICA_FONT",
        "ANALYTICA_SNAPSHOT",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "sampling": { "interval_ms": 250 },
        "providers": {
            "ready_timeout_ms": 2000,
            "detector": "stub",
            "pose": "stub",
            "synthetic_players": 5
        },
        "source": {
            "kind": "file",
            "path": "match_day.mp4",
            "width": 1280,
            "height": 720,
            "target_fps": 25,
            "duration_secs": 90.0
        },
        "overlay": { "snapshot_path": "overlay.png" }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("ANALYTICA_CONFIG", file.path());
    std::env::set_var("ANALYTICA_CALL_TIMEOUT_MS", "80");
    std::env::set_var("ANALYTICA_SOURCE_PATH", "second_half.mp4");

    let cfg = AnalyticaConfig::load().expect("load config");

    assert_eq!(cfg.interval, Duration::from_millis(250));
    assert_eq!(cfg.providers.ready_timeout, Duration::from_millis(2000));
    assert_eq!(cfg.call_timeout(), Duration::from_millis(80));
    assert_eq!(cfg.providers.synthetic_players, 5);
    assert_eq!(cfg.source.kind, SourceKind::File);
    assert_eq!(cfg.source.path, "second_half.mp4");
    assert_eq!(cfg.source.width, 1280);
    assert_eq!(cfg.source.height, 720);
    assert_eq!(cfg.source.target_fps, 25);
    assert_eq!(
        cfg.overlay.snapshot_path.as_deref(),
        Some(std::path::Path::new("overlay.png"))
    );

    let file_cfg = cfg.file_config();
    assert_eq!(file_cfg.path, "second_half.mp4");
    assert_eq!(file_cfg.metadata.frame_count(), 2250);
    assert_eq!(file_cfg.sample_interval, Duration::from_millis(250));

    let session = cfg.session_config();
    assert_eq!(session.interval, Duration::from_millis(250));
    assert_eq!(session.call_timeout, Duration::from_millis(80));

    clear_env();
}

#[test]
fn loads_toml_camera_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        [source]
        kind = "camera"
        facing = "environment"
        back_device = "/dev/video4"
        target_fps = 15
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = AnalyticaConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.source.kind, SourceKind::Camera);
    assert_eq!(cfg.source.facing, FacingMode::Back);

    let camera = cfg.camera_config();
    assert_eq!(camera.device(), "/dev/video4");
    assert_eq!(camera.target_fps, 15);

    clear_env();
}

#[test]
fn defaults_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AnalyticaConfig::load().expect("load defaults");
    assert_eq!(cfg.interval, Duration::from_millis(100));
    assert_eq!(cfg.call_timeout(), cfg.interval);
    assert_eq!(cfg.providers.detector, "stub");
    assert_eq!(cfg.providers.pose, "stub");
    assert_eq!(cfg.source.kind, SourceKind::File);
    assert_eq!(cfg.source.facing, FacingMode::Front);
    assert!(cfg.overlay.font_path.is_none());

    let pose = cfg.pose_settings();
    assert_eq!((pose.input_width, pose.input_height), (192, 192));

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ANALYTICA_INTERVAL_MS", "0");
    let err = AnalyticaConfig::load().unwrap_err();
    assert!(err.to_string().contains("interval"));
    clear_env();

    std::env::set_var("ANALYTICA_INTERVAL_MS", "fast");
    let err = AnalyticaConfig::load().unwrap_err();
    assert!(err.to_string().contains("ANALYTICA_INTERVAL_MS"));
    clear_env();

    std::env::set_var("ANALYTICA_FACING", "sideways");
    assert!(AnalyticaConfig::load().is_err());
    clear_env();

    std::env::set_var("ANALYTICA_SOURCE", "satellite");
    let err = AnalyticaConfig::load().unwrap_err();
    assert!(err.to_string().contains("file or camera"));

    clear_env();
}

#[test]
fn rejects_malformed_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    let err = AnalyticaConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
