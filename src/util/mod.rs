//! Small shared helpers: terminal progress rendering.

use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};

/// Whether to render progress bars: interactive stderr only, and never
/// when `NO_PROGRESS` is set.
#[must_use]
pub fn should_show_progress(quiet: bool) -> bool {
    if quiet || std::env::var_os("NO_PROGRESS").is_some() {
        return false;
    }
    std::io::stderr().is_terminal()
}

/// Percentage bar for operations with a known span.
#[must_use]
pub fn create_progress_bar(message: &str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:30.cyan/blue}] {percent:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_message(message.to_string());
    bar
}

/// Hidden stand-in with the same API, for quiet/non-tty runs.
#[must_use]
pub fn hidden_progress_bar() -> ProgressBar {
    ProgressBar::hidden()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_disables_progress() {
        assert!(!should_show_progress(true));
    }

    #[test]
    fn test_progress_bar_builds() {
        let bar = create_progress_bar("exporting");
        bar.set_position(42);
        bar.finish_and_clear();
    }
}
