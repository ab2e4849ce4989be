//! Terminal progress reporting for downloads.
//!
//! The CLI driver shows a byte based progress bar while a release downloads. Bars
//! are hidden in silent mode and when `UPDATER_NO_PROGRESS` is set, which keeps
//! logs from CI systems and scheduled runs clean.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};

/// Environment variable that disables all progress output.
pub const NO_PROGRESS_ENV: &str = "UPDATER_NO_PROGRESS";

fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some()
}

fn download_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {bytes} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Download progress bar that switches to a spinner while the size is unknown.
#[derive(Clone)]
pub struct DownloadProgress {
    inner: IndicatifBar,
}

impl DownloadProgress {
    /// Create a progress bar, hidden when `hidden` is set or progress is disabled.
    #[must_use]
    pub fn new(label: &str, hidden: bool) -> Self {
        let bar = if hidden || is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar
        };
        bar.set_prefix(label.to_string());
        Self {
            inner: bar,
        }
    }

    /// Update the bar with the current byte counts.
    pub fn update(&self, downloaded: u64, total: Option<u64>) {
        if let Some(total) = total {
            if self.inner.length() != Some(total) {
                self.inner.set_length(total);
                self.inner.set_style(download_style());
            }
        }
        self.inner.set_position(downloaded);
    }

    /// Finish the bar with a message.
    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    /// Remove the bar from the terminal.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}
