//! demo - end-to-end synthetic run
//!
//! Plays a synthetic match clip through stub providers with seeded detector noise, prints
//! the event log as it grows, and writes the final overlay next to the run summary.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pitch_analytica::detect::ready;
use pitch_analytica::ui::Ui;
use pitch_analytica::{
    FileConfig, FileSource, MediaMetadata, NearestTrackStore, ObjectDetector, PoseEstimator,
    QuantizedTrackStore, RasterSurface, Session, SessionConfig, StubDetector, StubPoseEstimator,
    TrackStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Clip length in seconds.
    #[arg(long, default_value_t = 5.0)]
    seconds: f64,
    /// Frames per second of the synthetic clip.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Players on the pitch.
    #[arg(long, default_value_t = 3)]
    players: usize,
    /// Seed for detector noise.
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Re-associate tracks within this many pixels instead of exact quantised keys.
    #[arg(long, value_name = "PX")]
    nearest_radius: Option<f32>,
    /// Output PNG for the final overlay.
    #[arg(long, default_value = "demo_overlay.png")]
    out: PathBuf,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.fps == 0 || args.seconds <= 0.0 {
        return Err(anyhow!("--fps and --seconds must be positive"));
    }

    let ui = Ui::from_args(
        Some(&args.ui),
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?
        .block_on(run(args, ui))
}

async fn run(args: Args, ui: Ui) -> Result<()> {
    let metadata = MediaMetadata {
        duration_secs: args.seconds,
        avg_fps: f64::from(args.fps),
        width: 640,
        height: 480,
    };
    let interval = Duration::from_secs_f64(1.0 / f64::from(args.fps));
    let source = FileSource::new(
        FileConfig::new("stub://demo")
            .with_metadata(metadata.clone())
            .with_sample_interval(interval),
    )?;

    let detector: Arc<dyn ObjectDetector> =
        Arc::new(StubDetector::synthetic(args.players).with_jitter(args.seed));
    let estimator: Arc<dyn PoseEstimator> = Arc::new(StubPoseEstimator::synthetic(args.players));

    let config = SessionConfig {
        interval,
        call_timeout: interval,
        ..SessionConfig::default()
    };
    let tracks: Box<dyn TrackStore + Send> = match args.nearest_radius {
        Some(radius) => Box::new(NearestTrackStore::new(radius)),
        None => Box::new(QuantizedTrackStore::new()),
    };
    let mut session = Session::with_track_store(config, tracks);

    {
        let _stage = ui.stage("Load providers");
        session
            .start(Box::new(source), ready(detector), ready(estimator))
            .await
            .map_err(|err| anyhow!("demo session failed to start: {err}"))?;
    }

    let mut surface = RasterSurface::new(metadata.width, metadata.height);
    let mut last_frame = None;
    let mut feed = ui.feed();
    let stats = session
        .run(&mut surface, |view| {
            feed.update(view.log, view.report);
            last_frame = Some(view.frame.clone());
        })
        .await?;
    feed.finish(session.log(), &stats);

    if let Some(frame) = last_frame {
        surface.save_snapshot(&frame, &args.out)?;
        println!("overlay written to {}", args.out.display());
    }
    println!("tracked identities: {}", session.tracks().len());
    Ok(())
}
