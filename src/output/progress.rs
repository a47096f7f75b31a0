use std::fmt::Display;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{elapsed, phase, success};

/// Spinner for the phase currently running, plus the progress lines printed
/// above it.
///
/// Progress lines go to stdout so they end up in CI job logs; the spinner
/// draws on stderr and stays hidden when stderr is not a terminal. The
/// spinner only moves when a poll reports in, so no ticker thread runs
/// next to the runtime.
pub struct PhaseProgress {
    pb: ProgressBar,
}

impl PhaseProgress {
    pub fn start_spawn_phase(sha: &str) -> Self {
        let pb = create_spinner(phase(format!("Waiting for a pipeline for {sha}")).to_string());
        Self { pb }
    }

    pub fn finish_spawn_start_completion(self, pipeline_id: u64) -> Self {
        self.pb.finish_and_clear();
        let pb = create_spinner(
            phase(format!("Waiting for pipeline #{pipeline_id} to complete")).to_string(),
        );
        Self { pb }
    }

    pub fn start_artifact(self, job_name: &str) -> Self {
        self.pb.finish_and_clear();
        let pb = create_spinner(
            phase(format!("Downloading artifact from job '{job_name}'")).to_string(),
        );
        Self { pb }
    }

    /// Shows the attempt counter next to the spinner and advances it.
    pub fn set_attempt(&self, attempt: u64, count: u64) {
        self.pb.set_prefix(format!("[{attempt}/{count}]"));
        self.pb.tick();
    }

    /// Prints a progress line prefixed with the elapsed seconds.
    pub fn line(&self, seconds: u64, message: impl Display) {
        self.pb
            .suspend(|| println!("{} {message}", elapsed(seconds)));
        self.pb.tick();
    }

    /// Prints a progress line without an elapsed-time prefix.
    pub fn note(&self, message: impl Display) {
        self.pb.suspend(|| println!("{message}"));
    }

    pub fn finish(self) {
        self.pb.finish_and_clear();
    }

    pub fn finish_with_success(self, message: &str) {
        self.pb
            .finish_with_message(success(format!("{message} ✓")).to_string());
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {prefix} {msg} {spinner}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb
}
