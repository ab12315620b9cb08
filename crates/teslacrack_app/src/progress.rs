//! Progress reporting for the CLI

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use teslacrack::scan::{ProgressCallback, ScanProgress};

/// Spinner fed by the scan's per-file callback.
pub struct ProgressReporter {
    bar: Arc<ProgressBar>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar: Arc::new(bar) }
    }

    /// Gets a callback for scan progress
    pub fn scan_callback(&self) -> ProgressCallback {
        let bar = Arc::clone(&self.bar);
        Box::new(move |progress: &ScanProgress| {
            bar.set_message(format!(
                "{} dirs, {} files | {}",
                progress.dirs_seen,
                progress.files_seen,
                progress.current.display()
            ));
        })
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
