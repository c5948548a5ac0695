use std::sync::Arc;
use std::time::Duration;

use pitch_analytica::detect::{ready, ProviderLoad};
use pitch_analytica::{
    BoundingBox, CameraConfig, CameraSource, CycleOutcome, Detection, FacingMode, FileConfig,
    FileSource, FrameSource, Keypoint, MediaMetadata, NearestTrackStore, ObjectDetector,
    PoseEstimator, RecordingSurface, Session, SessionConfig, SessionState, Severity, Skeleton,
    StubDetector, StubPoseEstimator, TickOutcome, MAX_LOG_ENTRIES,
};

fn clip(frames: u32, fps: f64) -> Box<dyn FrameSource> {
    let config = FileConfig::new("stub://match").with_metadata(MediaMetadata {
        duration_secs: f64::from(frames) / fps,
        avg_fps: fps,
        width: 320,
        height: 240,
    });
    Box::new(FileSource::new(config).unwrap())
}

fn detector(d: StubDetector) -> ProviderLoad<dyn ObjectDetector> {
    ready(Arc::new(d) as Arc<dyn ObjectDetector>)
}

fn estimator(e: StubPoseEstimator) -> ProviderLoad<dyn PoseEstimator> {
    ready(Arc::new(e) as Arc<dyn PoseEstimator>)
}

fn person(score: f32, bbox: BoundingBox) -> Detection {
    Detection::new("person", score, bbox)
}

async fn tick_report(
    session: &mut Session,
    surface: &mut RecordingSurface,
) -> pitch_analytica::CycleReport {
    match session.tick(surface).await {
        TickOutcome::Cycle { report, .. } => report,
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[tokio::test]
async fn confident_player_with_pose_is_fused_and_logged() {
    let mut session = Session::new(SessionConfig::default());
    let skeleton = Skeleton::new(vec![Keypoint::new("nose", 35.0, 40.0, 0.9)]);
    session
        .start(
            clip(3, 10.0),
            detector(StubDetector::fixed(vec![person(
                0.9,
                BoundingBox::new(10.0, 20.0, 50.0, 100.0),
            )])),
            estimator(StubPoseEstimator::fixed(vec![skeleton])),
        )
        .await
        .unwrap();

    let mut surface = RecordingSurface::new();
    let report = tick_report(&mut session, &mut surface).await;

    assert_eq!(report.outcome, CycleOutcome::Players(1));
    assert_eq!(report.players.len(), 1);
    assert_eq!(report.players[0].centroid, (35.0, 70.0));
    assert!(report.players[0].has_skeleton);
    assert!(surface.draw_calls() > 0);

    let entry = session.log().latest().unwrap();
    assert_eq!(entry.severity, Severity::Info);
    assert!(entry.message.contains("1 players detected"));
}

#[tokio::test]
async fn low_score_detection_warns_without_drawing() {
    let mut session = Session::new(SessionConfig::default());
    session
        .start(
            clip(3, 10.0),
            detector(StubDetector::fixed(vec![person(
                0.4,
                BoundingBox::new(10.0, 20.0, 50.0, 100.0),
            )])),
            estimator(StubPoseEstimator::empty()),
        )
        .await
        .unwrap();

    let mut surface = RecordingSurface::new();
    let report = tick_report(&mut session, &mut surface).await;

    assert_eq!(report.outcome, CycleOutcome::NoPlayers);
    assert_eq!(surface.draw_calls(), 0);
    let entry = session.log().latest().unwrap();
    assert_eq!(entry.severity, Severity::Warning);
    assert!(entry.message.starts_with("No players detected"));
}

#[tokio::test]
async fn detector_failure_is_contained_and_next_cycle_recovers() {
    let mut session = Session::new(SessionConfig::default());
    let bbox = BoundingBox::new(40.0, 40.0, 20.0, 60.0);
    session
        .start(
            clip(4, 10.0),
            detector(StubDetector::sequence(vec![
                Err("model crashed".to_string()),
                Ok(vec![person(0.8, bbox)]),
            ])),
            estimator(StubPoseEstimator::empty()),
        )
        .await
        .unwrap();

    let mut surface = RecordingSurface::new();
    let first = tick_report(&mut session, &mut surface).await;
    assert!(matches!(first.outcome, CycleOutcome::Failed(_)));
    let entry = session.log().latest().unwrap();
    assert_eq!(entry.severity, Severity::Error);
    assert_eq!(entry.message, "Error at 0.00s: detection failed: model crashed");

    let second = tick_report(&mut session, &mut surface).await;
    assert_eq!(second.outcome, CycleOutcome::Players(1));
    assert_eq!(
        session.log().latest().unwrap().message,
        "Frame @ 0.10s: 1 players detected"
    );
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn same_identity_reports_speed_across_cycles() {
    let mut session =
        Session::with_track_store(SessionConfig::default(), Box::new(NearestTrackStore::new(15.0)));
    session
        .start(
            clip(2, 1.0),
            detector(StubDetector::sequence(vec![
                Ok(vec![person(0.9, BoundingBox::new(80.0, 60.0, 40.0, 80.0))]),
                Ok(vec![person(0.9, BoundingBox::new(80.0, 70.0, 40.0, 80.0))]),
            ])),
            estimator(StubPoseEstimator::empty()),
        )
        .await
        .unwrap();

    let mut surface = RecordingSurface::new();
    let first = tick_report(&mut session, &mut surface).await;
    assert_eq!(first.players[0].centroid, (100.0, 100.0));
    assert_eq!(first.players[0].speed, 0.0);

    let second = tick_report(&mut session, &mut surface).await;
    assert_eq!(second.players[0].centroid, (100.0, 110.0));
    assert!((second.players[0].speed - 10.0).abs() < 1e-4);
    assert_eq!(second.players[0].track_id, first.players[0].track_id);
    assert_eq!(session.tracks().len(), 1);
}

#[tokio::test]
async fn fast_clip_speed_follows_media_time() {
    // 30 fps broadcast sampled every 100 ms; synthetic players drift at 40 px/s.
    let config = FileConfig::new("stub://broadcast").with_metadata(MediaMetadata {
        duration_secs: 1.0,
        avg_fps: 30.0,
        width: 320,
        height: 240,
    });
    let mut session =
        Session::with_track_store(SessionConfig::default(), Box::new(NearestTrackStore::new(20.0)));
    session
        .start(
            Box::new(FileSource::new(config).unwrap()),
            detector(StubDetector::synthetic(1)),
            estimator(StubPoseEstimator::empty()),
        )
        .await
        .unwrap();

    let mut surface = RecordingSurface::new();
    let mut stamps = Vec::new();
    let mut speeds = Vec::new();
    for _ in 0..4 {
        let report = tick_report(&mut session, &mut surface).await;
        stamps.push(report.timestamp);
        speeds.push(report.players[0].speed);
    }

    for (i, stamp) in stamps.iter().enumerate() {
        assert!((stamp - i as f64 * 0.1).abs() < 1e-6, "cycle {i} sampled at {stamp}");
    }
    assert_eq!(speeds[0], 0.0);
    for speed in &speeds[1..] {
        assert!((speed - 40.0).abs() < 0.01, "speed {speed}");
    }
}

#[tokio::test]
async fn event_log_stays_bounded_over_long_runs() {
    let mut session = Session::new(SessionConfig::default());
    session
        .start(
            clip(120, 10.0),
            detector(StubDetector::synthetic(2)),
            estimator(StubPoseEstimator::synthetic(2)),
        )
        .await
        .unwrap();

    let mut surface = RecordingSurface::new();
    let mut cycles = 0;
    loop {
        match session.tick(&mut surface).await {
            TickOutcome::Cycle { .. } => cycles += 1,
            TickOutcome::Skipped => {}
            TickOutcome::Finished => break,
        }
    }

    assert_eq!(cycles, 120);
    assert_eq!(session.log().len(), MAX_LOG_ENTRIES);
    assert_eq!(session.log().latest().unwrap().message, "end of stream");
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn run_drives_the_clip_to_completion() {
    let config = SessionConfig {
        interval: Duration::from_millis(50),
        call_timeout: Duration::from_millis(50),
        ..SessionConfig::default()
    };
    let mut session = Session::new(config);
    session
        .start(
            clip(6, 10.0),
            detector(StubDetector::synthetic(1)),
            estimator(StubPoseEstimator::synthetic(1)),
        )
        .await
        .unwrap();

    let mut surface = RecordingSurface::new();
    let mut seen = Vec::new();
    let stats = session
        .run(&mut surface, |view| seen.push(view.report.timestamp))
        .await
        .unwrap();

    assert_eq!(stats.cycles_run, 6);
    assert_eq!(seen.len(), 6);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn denied_camera_leaves_session_idle() {
    let mut session = Session::new(SessionConfig::default());
    let source = CameraSource::new(CameraConfig {
        facing: FacingMode::Front,
        front_device: "stub://denied".into(),
        back_device: "stub://back".into(),
        ..CameraConfig::default()
    });
    let result = session
        .start(
            Box::new(source),
            detector(StubDetector::empty()),
            estimator(StubPoseEstimator::empty()),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session
        .log()
        .latest()
        .unwrap()
        .message
        .starts_with("failed to access capture device"));
}
