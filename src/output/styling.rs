use std::fmt::Display;

use console::{style, StyledObject};

use crate::providers::gitlab::types::PipelineStatus;

/// Spinner message for the phase in progress.
pub fn phase(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).yellow().bright()
}

pub fn success(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).green().bright()
}

pub fn failure(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).red().bright()
}

/// Colors a pipeline status by where it leaves the wait: green once it
/// succeeded, red once it can no longer succeed, cyan while still open.
pub fn status(status: &PipelineStatus) -> StyledObject<String> {
    let styled = style(status.to_string());
    if status.is_success() {
        styled.green()
    } else if status.is_failure() {
        styled.red()
    } else {
        styled.cyan()
    }
}

/// `[Ns]` prefix of a progress line.
pub fn elapsed(seconds: u64) -> StyledObject<String> {
    style(format!("[{seconds}s]")).dim()
}

pub fn muted(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}

pub fn title(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).magenta().bold()
}
