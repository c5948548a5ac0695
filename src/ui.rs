use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::event_log::EventLog;
use crate::pipeline::CycleReport;
use crate::session::SessionStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = spinner();
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Live view of a running session: new event log lines plus a status line.
    pub fn feed(&self) -> LogFeed {
        let spinner = self.use_pretty().then(spinner);
        LogFeed {
            next_seq: 0,
            spinner,
        }
    }
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(Duration::from_millis(120));
    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Prints event log lines that appeared since the last update.
pub struct LogFeed {
    next_seq: u64,
    spinner: Option<ProgressBar>,
}

impl LogFeed {
    /// Print new log lines and refresh the status line for `report`.
    pub fn update(&mut self, log: &EventLog, report: &CycleReport) {
        self.drain(log);
        if let Some(spinner) = &self.spinner {
            spinner.set_message(status_line(report));
        }
    }

    /// Print every line appended since the last drain. Returns how many were printed.
    fn drain(&mut self, log: &EventLog) -> usize {
        let mut printed = 0;
        for entry in log.since(self.next_seq) {
            match &self.spinner {
                Some(spinner) => spinner.println(entry.to_string()),
                None => eprintln!("{entry}"),
            }
            printed += 1;
        }
        self.next_seq = log.next_seq();
        printed
    }

    /// Flush trailing lines such as "end of stream", then print the run summary.
    pub fn finish(mut self, log: &EventLog, stats: &SessionStats) {
        self.drain(log);
        let summary = format!(
            "✔ {} cycles ({} without players, {} failed), {} dropped, {} skipped, {} provider errors",
            stats.cycles_run,
            stats.cycles_without_players,
            stats.cycles_failed,
            stats.cycles_dropped,
            stats.ticks_skipped,
            stats.provider_errors
        );
        match self.spinner {
            Some(spinner) => spinner.finish_with_message(summary),
            None => eprintln!("{summary}"),
        }
    }
}

fn status_line(report: &CycleReport) -> String {
    let fastest = report
        .players
        .iter()
        .map(|p| p.speed)
        .fold(None, |best: Option<f32>, s| Some(best.map_or(s, |b| b.max(s))));
    match fastest {
        Some(speed) => format!(
            "t={:.2}s players={} top speed {:.1} px/s",
            report.timestamp,
            report.players.len(),
            speed
        ),
        None => format!("t={:.2}s no players", report.timestamp),
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
