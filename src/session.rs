//! Analysis session and sampling loop.
//!
//! A `Session` owns one frame source, one track store and one event log. Its lifecycle is
//! `Idle -> Loading -> Active -> Stopped`:
//!
//! - `start` connects the source, then waits for both capability providers to settle.
//!   Each provider's readiness is logged on its own as it resolves.
//! - `run` samples the source on a fixed interval and runs one pipeline cycle per tick.
//!   Cycles never overlap: ticks that fall due while a cycle is in flight are dropped.
//! - End of stream, a source error or a stop request ends the loop.
//!
//! Stop and pause requests come in through a cloneable `SessionControl`, so a signal
//! handler can end a running loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::detect::{
    await_ready, ObjectDetector, PoseEstimator, ProviderLoad, DEFAULT_READY_TIMEOUT,
    OBJECT_DETECTOR, POSE_ESTIMATOR,
};
use crate::error::{ProviderError, SessionError, SourceError};
use crate::event_log::EventLog;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::overlay::OverlaySurface;
use crate::pipeline::{CycleOutcome, CycleReport, Pipeline, Providers};
use crate::track::{QuantizedTrackStore, TrackStore};

/// Default sampling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Timing parameters for a session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Time between sampling ticks.
    pub interval: Duration,
    /// Bound on provider initialisation.
    pub ready_timeout: Duration,
    /// Bound on each detector / estimator call.
    pub call_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            call_timeout: DEFAULT_INTERVAL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Source connected, waiting for providers.
    Loading,
    /// Sampling.
    Active,
    Stopped,
}

impl SessionState {
    fn label(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Loading => "loading",
            SessionState::Active => "active",
            SessionState::Stopped => "stopped",
        }
    }
}

/// Counters for one session run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub cycles_run: u64,
    /// Ticks dropped because a cycle was still in flight.
    pub cycles_dropped: u64,
    /// Ticks skipped while the source was paused or ended.
    pub ticks_skipped: u64,
    pub cycles_without_players: u64,
    pub cycles_failed: u64,
    pub provider_errors: u64,
}

impl SessionStats {
    fn record(&mut self, report: &CycleReport) {
        self.cycles_run += 1;
        self.provider_errors += report.provider_errors.len() as u64;
        match report.outcome {
            CycleOutcome::Players(_) => {}
            CycleOutcome::NoPlayers => self.cycles_without_players += 1,
            CycleOutcome::Failed(_) => self.cycles_failed += 1,
        }
    }
}

/// Cloneable handle for stopping or pausing a session from elsewhere.
#[derive(Clone)]
pub struct SessionControl {
    stop: Arc<watch::Sender<bool>>,
    paused: Arc<AtomicBool>,
}

impl SessionControl {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                stop: Arc::new(tx),
                paused: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Ask the session to stop. The sampling loop exits before its next cycle.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    fn pause_requested(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.stop.send_replace(false);
        self.paused.store(false, Ordering::SeqCst);
    }
}

/// Result of one sampling tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// A cycle ran on `frame`.
    Cycle { frame: Frame, report: CycleReport },
    /// Source paused or providers unavailable; nothing was logged.
    Skipped,
    /// The source is exhausted or failed; the loop must end.
    Finished,
}

/// What an observer sees after each cycle.
pub struct CycleView<'a, S> {
    pub frame: &'a Frame,
    pub report: &'a CycleReport,
    pub surface: &'a S,
    pub log: &'a EventLog,
}

/// One analysis run over one frame source.
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    pipeline: Pipeline,
    providers: Providers,
    source: Option<Box<dyn FrameSource>>,
    tracks: Box<dyn TrackStore + Send>,
    log: EventLog,
    stats: SessionStats,
    control: SessionControl,
    stop_rx: watch::Receiver<bool>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_track_store(config, Box::new(QuantizedTrackStore::new()))
    }

    /// Use a different identity strategy for kinematics.
    pub fn with_track_store(config: SessionConfig, tracks: Box<dyn TrackStore + Send>) -> Self {
        let (control, stop_rx) = SessionControl::new();
        Self {
            pipeline: Pipeline::new(config.call_timeout),
            config,
            state: SessionState::Idle,
            providers: Providers::default(),
            source: None,
            tracks,
            log: EventLog::new(),
            stats: SessionStats::default(),
            control,
            stop_rx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn tracks(&self) -> &dyn TrackStore {
        self.tracks.as_ref()
    }

    /// Acquire `source` and wait for both providers to settle.
    ///
    /// A refused or unreadable source is logged and leaves the session `Idle`. A provider
    /// that fails to load is logged and contributes nothing; if both fail the session stops.
    pub async fn start(
        &mut self,
        mut source: Box<dyn FrameSource>,
        detector: ProviderLoad<dyn ObjectDetector>,
        estimator: ProviderLoad<dyn PoseEstimator>,
    ) -> Result<(), SessionError> {
        if self.config.interval.is_zero() {
            return Err(SessionError::ZeroInterval);
        }
        match self.state {
            SessionState::Loading | SessionState::Active => {
                return Err(SessionError::AlreadyActive(self.state.label()))
            }
            SessionState::Stopped => self.teardown(),
            SessionState::Idle => {}
        }
        self.control.reset();
        self.stop_rx.borrow_and_update();
        self.stats = SessionStats::default();

        if let Err(err) = source.connect() {
            let line = match &err {
                SourceError::CaptureDenied { .. } => {
                    format!("failed to access capture device: {err}")
                }
                _ => format!("error loading video: {err}"),
            };
            self.log.error(line);
            source.release();
            self.state = SessionState::Idle;
            return Err(err.into());
        }
        self.source = Some(source);
        self.state = SessionState::Loading;
        log::info!("session loading capability providers");

        let Some(providers) = self.load_providers(detector, estimator).await else {
            log::info!("session stopped while loading");
            self.teardown();
            self.state = SessionState::Stopped;
            return Ok(());
        };
        if providers.is_empty() {
            self.log.error("no capability provider became ready; stopping");
            self.release_source();
            self.state = SessionState::Stopped;
            return Err(SessionError::ProvidersUnavailable);
        }

        self.providers = providers;
        self.state = SessionState::Active;
        log::info!(
            "session active (interval {:?}, call timeout {:?})",
            self.config.interval,
            self.pipeline.call_timeout()
        );
        Ok(())
    }

    /// Settle both loads concurrently. `None` when a stop arrives first.
    async fn load_providers(
        &mut self,
        detector: ProviderLoad<dyn ObjectDetector>,
        estimator: ProviderLoad<dyn PoseEstimator>,
    ) -> Option<Providers> {
        let wait = self.config.ready_timeout;
        let detector = await_ready(OBJECT_DETECTOR, detector, wait);
        let estimator = await_ready(POSE_ESTIMATOR, estimator, wait);
        tokio::pin!(detector, estimator);

        let mut stop_rx = self.stop_rx.clone();
        let mut providers = Providers::default();
        let (mut detector_done, mut estimator_done) = (false, false);
        while !(detector_done && estimator_done) {
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        return None;
                    }
                }
                result = &mut detector, if !detector_done => {
                    detector_done = true;
                    providers.detector = self.settle_load(OBJECT_DETECTOR, result);
                }
                result = &mut estimator, if !estimator_done => {
                    estimator_done = true;
                    providers.estimator = self.settle_load(POSE_ESTIMATOR, result);
                }
            }
        }
        Some(providers)
    }

    fn settle_load<P: ?Sized>(
        &mut self,
        label: &str,
        result: Result<Arc<P>, ProviderError>,
    ) -> Option<Arc<P>> {
        match result {
            Ok(provider) => {
                self.log.info(format!("{label} ready"));
                Some(provider)
            }
            Err(err) => {
                let cause = match err {
                    ProviderError::ModelUnavailable { reason, .. } => reason,
                    other => other.to_string(),
                };
                self.log.error(format!("failed to load {label}: {cause}"));
                None
            }
        }
    }

    /// Sample the source until it ends or a stop is requested.
    ///
    /// `observe` is called after every cycle with the frame, report, rendered surface and log.
    pub async fn run<S: OverlaySurface>(
        &mut self,
        surface: &mut S,
        mut observe: impl FnMut(CycleView<'_, S>),
    ) -> Result<SessionStats, SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::NotActive);
        }

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stop_rx = self.stop_rx.clone();

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        log::info!("session stop requested");
                        let stats = self.stats.clone();
                        self.stop();
                        return Ok(stats);
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match self.tick(surface).await {
                TickOutcome::Cycle { frame, report } => observe(CycleView {
                    frame: &frame,
                    report: &report,
                    surface: &*surface,
                    log: &self.log,
                }),
                TickOutcome::Skipped => {}
                TickOutcome::Finished => break,
            }
        }

        log::info!("session stopped: {:?}", self.stats);
        Ok(self.stats.clone())
    }

    /// Run one sampling tick.
    ///
    /// Paused or exhausted sources are skipped without a log entry. The cycle's duration is
    /// measured so that ticks it overran are counted as dropped.
    pub async fn tick<S: OverlaySurface>(&mut self, surface: &mut S) -> TickOutcome {
        if self.state != SessionState::Active {
            return TickOutcome::Finished;
        }
        let Some(source) = self.source.as_mut() else {
            return TickOutcome::Finished;
        };

        let pause = self.control.pause_requested();
        if pause != source.is_paused() {
            source.set_paused(pause);
        }
        if source.is_paused() || self.providers.is_empty() {
            self.stats.ticks_skipped += 1;
            return TickOutcome::Skipped;
        }
        if source.is_ended() {
            self.finish_stream();
            return TickOutcome::Finished;
        }

        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(SourceError::EndOfStream) => {
                self.log.info("end of stream");
                self.finish_stream();
                return TickOutcome::Finished;
            }
            Err(err) => {
                self.log.error(format!("source error: {err}"));
                self.finish_stream();
                return TickOutcome::Finished;
            }
        };

        let started = Instant::now();
        let report = self
            .pipeline
            .run_cycle(
                &frame,
                &self.providers,
                self.tracks.as_mut(),
                surface,
                &mut self.log,
            )
            .await;
        let overran = started.elapsed().as_nanos() / self.config.interval.as_nanos().max(1);
        self.stats.cycles_dropped += overran as u64;
        self.stats.record(&report);

        TickOutcome::Cycle { frame, report }
    }

    /// Tear the session down: release the source and clear tracks and log.
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.teardown();
        self.state = SessionState::Stopped;
        log::info!("session torn down");
    }

    fn teardown(&mut self) {
        self.release_source();
        self.providers = Providers::default();
        self.tracks.clear();
        self.log.clear();
    }

    /// The source is exhausted. Log and tracks stay readable until the next start.
    fn finish_stream(&mut self) {
        self.release_source();
        self.state = SessionState::Stopped;
    }

    fn release_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release_source();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ready, BoundingBox, Detection, StubDetector, StubPoseEstimator};
    use crate::event_log::Severity;
    use crate::ingest::{CameraConfig, CameraSource, FacingMode, FileConfig, FileSource, MediaMetadata};
    use crate::overlay::RecordingSurface;

    fn clip(frames: u32) -> Box<dyn FrameSource> {
        let config = FileConfig::new("stub://clip").with_metadata(MediaMetadata {
            duration_secs: f64::from(frames) / 10.0,
            avg_fps: 10.0,
            width: 64,
            height: 48,
        });
        Box::new(FileSource::new(config).unwrap())
    }

    fn detector(d: StubDetector) -> ProviderLoad<dyn ObjectDetector> {
        ready(Arc::new(d) as Arc<dyn ObjectDetector>)
    }

    fn estimator(e: StubPoseEstimator) -> ProviderLoad<dyn PoseEstimator> {
        ready(Arc::new(e) as Arc<dyn PoseEstimator>)
    }

    fn failing_estimator() -> ProviderLoad<dyn PoseEstimator> {
        Box::pin(async { Err(anyhow::anyhow!("weights missing")) })
    }

    fn one_player() -> StubDetector {
        StubDetector::fixed(vec![Detection::new(
            "person",
            0.9,
            BoundingBox::new(4.0, 4.0, 8.0, 16.0),
        )])
    }

    fn messages(session: &Session) -> Vec<String> {
        session.log().entries().map(|e| e.message.clone()).collect()
    }

    #[tokio::test]
    async fn start_logs_each_provider_and_activates() {
        let mut session = Session::new(SessionConfig::default());
        session
            .start(clip(3), detector(one_player()), estimator(StubPoseEstimator::empty()))
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Active);
        let lines = messages(&session);
        assert!(lines.contains(&"object detector ready".to_string()));
        assert!(lines.contains(&"pose estimator ready".to_string()));
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let mut session = Session::new(SessionConfig::default());
        session
            .start(clip(3), detector(one_player()), estimator(StubPoseEstimator::empty()))
            .await
            .unwrap();
        let err = session
            .start(clip(3), detector(one_player()), estimator(StubPoseEstimator::empty()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AlreadyActive("active")));
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn capture_denied_returns_to_idle() {
        let mut session = Session::new(SessionConfig::default());
        let source = CameraSource::new(CameraConfig {
            facing: FacingMode::Back,
            front_device: "stub://front".into(),
            back_device: "stub://denied".into(),
            ..CameraConfig::default()
        });
        let err = session
            .start(
                Box::new(source),
                detector(one_player()),
                estimator(StubPoseEstimator::empty()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Source(SourceError::CaptureDenied { .. })));
        assert_eq!(session.state(), SessionState::Idle);
        let entry = session.log().latest().unwrap();
        assert_eq!(entry.severity, Severity::Error);
        assert!(entry.message.starts_with("failed to access capture device"));
    }

    #[tokio::test]
    async fn failed_provider_degrades_but_runs() {
        let mut session = Session::new(SessionConfig::default());
        session
            .start(clip(2), detector(one_player()), failing_estimator())
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.providers().estimator.is_none());
        assert!(messages(&session).contains(&"failed to load pose estimator: weights missing".to_string()));

        let mut surface = RecordingSurface::new();
        match session.tick(&mut surface).await {
            TickOutcome::Cycle { report, .. } => assert_eq!(report.outcome, CycleOutcome::Players(1)),
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn both_providers_failing_stops_session() {
        let mut session = Session::new(SessionConfig::default());
        let failing_detector: ProviderLoad<dyn ObjectDetector> =
            Box::pin(async { Err(anyhow::anyhow!("no weights")) });
        let err = session
            .start(clip(2), failing_detector, failing_estimator())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ProvidersUnavailable));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn paused_ticks_are_silent() {
        let mut session = Session::new(SessionConfig::default());
        session
            .start(clip(5), detector(one_player()), estimator(StubPoseEstimator::empty()))
            .await
            .unwrap();
        let before = session.log().len();
        let control = session.control();
        let mut surface = RecordingSurface::new();

        control.pause();
        assert!(matches!(session.tick(&mut surface).await, TickOutcome::Skipped));
        assert_eq!(session.log().len(), before);
        assert_eq!(session.stats().ticks_skipped, 1);

        control.resume();
        assert!(matches!(session.tick(&mut surface).await, TickOutcome::Cycle { .. }));
        assert_eq!(session.log().len(), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_end_of_stream() {
        let mut session = Session::new(SessionConfig::default());
        session
            .start(clip(4), detector(one_player()), estimator(StubPoseEstimator::empty()))
            .await
            .unwrap();
        let mut surface = RecordingSurface::new();
        let mut seen = Vec::new();
        let stats = session
            .run(&mut surface, |view| seen.push(view.frame.timestamp_secs))
            .await
            .unwrap();

        assert_eq!(stats.cycles_run, 4);
        assert_eq!(seen.len(), 4);
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.log().latest().unwrap().message, "end of stream");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_cycles_drop_ticks_instead_of_queueing() {
        let config = SessionConfig {
            call_timeout: Duration::from_secs(1),
            ..SessionConfig::default()
        };
        let mut session = Session::new(config);
        session
            .start(
                clip(3),
                detector(one_player().with_latency(Duration::from_millis(250))),
                estimator(StubPoseEstimator::empty()),
            )
            .await
            .unwrap();
        let mut surface = RecordingSurface::new();
        let stats = session.run(&mut surface, |_| {}).await.unwrap();

        assert_eq!(stats.cycles_run, 3);
        assert!(stats.cycles_dropped >= 3 * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_request_tears_down() {
        let mut session = Session::new(SessionConfig::default());
        session
            .start(clip(1000), detector(one_player()), estimator(StubPoseEstimator::empty()))
            .await
            .unwrap();
        let control = session.control();
        let mut surface = RecordingSurface::new();
        let stats = session
            .run(&mut surface, |view| {
                if view.report.timestamp >= 0.35 {
                    control.stop();
                }
            })
            .await
            .unwrap();

        assert_eq!(stats.cycles_run, 5);
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.log().is_empty());
        assert!(session.tracks().is_empty());
    }

    #[tokio::test]
    async fn restart_after_stop_begins_clean() {
        let mut session = Session::new(SessionConfig::default());
        session
            .start(clip(2), detector(one_player()), estimator(StubPoseEstimator::empty()))
            .await
            .unwrap();
        let mut surface = RecordingSurface::new();
        session.tick(&mut surface).await;
        assert!(!session.tracks().is_empty());
        session.stop();

        session
            .start(clip(2), detector(one_player()), estimator(StubPoseEstimator::empty()))
            .await
            .unwrap();
        assert!(session.tracks().is_empty());
        assert_eq!(session.stats(), &SessionStats::default());
    }

    #[tokio::test]
    async fn zero_interval_is_rejected_before_acquiring_the_source() {
        let config = SessionConfig {
            interval: Duration::ZERO,
            ..SessionConfig::default()
        };
        let mut session = Session::new(config);
        let err = session
            .start(clip(3), detector(one_player()), estimator(StubPoseEstimator::empty()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ZeroInterval));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.log().is_empty());

        let mut surface = RecordingSurface::new();
        assert!(matches!(
            session.run(&mut surface, |_| {}).await,
            Err(SessionError::NotActive)
        ));
    }

    #[tokio::test]
    async fn run_requires_active_session() {
        let mut session = Session::new(SessionConfig::default());
        let mut surface = RecordingSurface::new();
        assert!(matches!(
            session.run(&mut surface, |_| {}).await,
            Err(SessionError::NotActive)
        ));
    }
}
