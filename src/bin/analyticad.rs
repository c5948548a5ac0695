//! analyticad - player tracking daemon
//!
//! This daemon:
//! 1. Loads configuration (ANALYTICA_CONFIG file, then environment, then flags)
//! 2. Acquires a file or capture-device frame source
//! 3. Loads the object detector and pose estimator
//! 4. Samples frames on a fixed interval until the source ends or Ctrl-C
//! 5. Streams the event log to stderr and optionally writes an overlay snapshot

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use pitch_analytica::ui::Ui;
use pitch_analytica::{
    AnalyticaConfig, CameraSource, FileSource, FrameSource, ProviderRegistry, RasterSurface,
    Session, SourceKind,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time player tracking daemon")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(long, env = "ANALYTICA_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Read from a capture device instead of a file
    #[arg(long)]
    camera: bool,

    /// Video file to analyse (overrides source.path)
    #[arg(long, value_name = "PATH", conflicts_with = "camera")]
    file: Option<String>,

    /// Camera facing mode (front|back)
    #[arg(long, value_name = "MODE")]
    facing: Option<String>,

    /// Write the composited overlay to this PNG after every cycle
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,

    /// List available provider backends and exit
    #[arg(long)]
    list_backends: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let registry = ProviderRegistry::with_builtin();
    if args.list_backends {
        println!("detectors: {}", registry.detector_names().join(", "));
        println!("pose estimators: {}", registry.estimator_names().join(", "));
        return Ok(());
    }

    let mut config = AnalyticaConfig::load_from(args.config.as_deref())?;
    if args.camera {
        config.source.kind = SourceKind::Camera;
    }
    if let Some(path) = &args.file {
        config.source.kind = SourceKind::File;
        config.source.path = path.clone();
    }
    if let Some(facing) = &args.facing {
        config.source.facing = facing.parse()?;
    }
    if let Some(path) = &args.snapshot {
        config.overlay.snapshot_path = Some(path.clone());
    }

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(run(config, registry, ui))
}

async fn run(config: AnalyticaConfig, registry: ProviderRegistry, ui: Ui) -> Result<()> {
    let source: Box<dyn FrameSource> = match config.source.kind {
        SourceKind::File => Box::new(FileSource::new(config.file_config())?),
        SourceKind::Camera => Box::new(CameraSource::new(config.camera_config())),
    };
    let detector = registry.detector(&config.providers.detector, &config.detector_settings())?;
    let estimator = registry.estimator(&config.providers.pose, &config.pose_settings())?;

    let mut session = Session::new(config.session_config());
    let control = session.control();
    ctrlc::set_handler(move || control.stop()).context("set Ctrl-C handler")?;

    {
        let _stage = ui.stage("Start session");
        session
            .start(source, detector, estimator)
            .await
            .map_err(|err| anyhow!("session failed to start: {err}"))?;
    }

    let mut surface = RasterSurface::new(config.source.width, config.source.height);
    if let Some(font) = &config.overlay.font_path {
        surface = match surface.with_font_file(font) {
            Ok(surface) => surface,
            Err(err) => {
                log::warn!("overlay text disabled: {err:#}");
                RasterSurface::new(config.source.width, config.source.height)
            }
        };
    }

    log::info!("analyticad running. press Ctrl-C to stop");
    let snapshot = config.overlay.snapshot_path.clone();
    let mut feed = ui.feed();
    let stats = session
        .run(&mut surface, |view| {
            feed.update(view.log, view.report);
            if let Some(path) = &snapshot {
                if let Err(err) = view.surface.save_snapshot(view.frame, path) {
                    log::warn!("snapshot failed: {err:#}");
                }
            }
        })
        .await?;
    feed.finish(session.log(), &stats);
    Ok(())
}
