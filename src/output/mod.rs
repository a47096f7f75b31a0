mod progress;
mod styling;

pub use progress::PhaseProgress;
pub use styling::{failure, status, success};

use styling::{muted, title};

/// Prints the `pipewait` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        title("⏳ pipewait"),
        muted(env!("CARGO_PKG_VERSION")),
        muted("GitLab pipeline waiter")
    );
}
