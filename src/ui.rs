//! Terminal progress for the `facecloak` binary.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::session::PipelineStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn parse(flag: Option<&str>) -> Self {
        match flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    quiet: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, quiet: bool) -> Self {
        Self {
            mode,
            is_tty,
            quiet,
        }
    }

    fn pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.quiet,
                UiMode::Plain => false,
            }
    }

    /// A named startup step; reports its duration when dropped.
    pub fn stage(&self, name: &str) -> StageGuard {
        let spinner = if self.pretty() {
            let spinner = spinner_with("{spinner} {msg}");
            spinner.set_message(format!("{name}…"));
            Some(spinner)
        } else {
            if !self.quiet {
                eprintln!("==> {}", name);
            }
            None
        };
        StageGuard {
            name: name.to_string(),
            start: Instant::now(),
            spinner,
            quiet: self.quiet,
        }
    }

    /// Live status line for the run loop. Plain mode prints nothing until `finish`.
    pub fn live(&self) -> LiveStatus {
        LiveStatus {
            spinner: self
                .pretty()
                .then(|| spinner_with("{spinner} {elapsed} {msg}")),
        }
    }
}

fn spinner_with(template: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(Duration::from_millis(120));
    let style =
        ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    quiet: bool,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else if !self.quiet {
            eprintln!("{message}");
        }
    }
}

pub struct LiveStatus {
    spinner: Option<ProgressBar>,
}

impl LiveStatus {
    pub fn update(&self, stats: &PipelineStats, faces: usize) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(status_line(stats, faces));
        }
    }

    pub fn finish(self, stats: &PipelineStats) {
        let message = format!(
            "✔ {} frames forwarded, {} skipped",
            stats.gate.forwarded,
            stats.gate.dropped_busy + stats.gate.dropped_throttled
        );
        match self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

fn status_line(stats: &PipelineStats, faces: usize) -> String {
    format!(
        "{:.1} fps | {} face{} | {} detections",
        stats.frames_per_sec,
        faces,
        if faces == 1 { "" } else { "s" },
        stats.results_published
    )
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::GateStats;

    #[test]
    fn status_line_pluralizes_faces() {
        let stats = PipelineStats {
            session: None,
            gate: GateStats::default(),
            frames_per_sec: 29.96,
            results_published: 7,
            results_rejected: 0,
        };
        assert_eq!(status_line(&stats, 1), "30.0 fps | 1 face | 7 detections");
        assert_eq!(status_line(&stats, 3), "30.0 fps | 3 faces | 7 detections");
    }

    #[test]
    fn ui_mode_parses_flags() {
        assert_eq!(UiMode::parse(Some("plain")), UiMode::Plain);
        assert_eq!(UiMode::parse(None), UiMode::Auto);
    }
}
