//! 📊 progress.rs: "Are we there yet?" Every pipeline, every time, forever.
//!
//! One bar, one tick per submitted batch, and the `[ordinal/total]` marker as its
//! message. The same marker also goes to the logs, so a run piped to a file still
//! tells you how far it got.
//!
//! ⚠️ Watching this progress bar will not make it go faster. We've tried. 🦆

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::planner::BatchBoundary;

pub(crate) struct BatchProgress {
    progress_bar: ProgressBar,
}

impl std::fmt::Debug for BatchProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("BatchProgress")
            .field("position", &self.progress_bar.position())
            .finish()
    }
}

impl BatchProgress {
    pub(crate) fn new(total_batches: usize) -> Self {
        let progress_bar = ProgressBar::new(total_batches as u64);
        // -- 🐛 the template is hardcoded; if it ever fails to parse we fall back to the default bar
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {elapsed_precise}")
        {
            progress_bar.set_style(style.progress_chars("=>-"));
        }
        Self { progress_bar }
    }

    /// 🙈 No terminal output at all. For tests and for runs that only care about the summary.
    pub(crate) fn hidden() -> Self {
        Self {
            progress_bar: ProgressBar::hidden(),
        }
    }

    /// 🎯 `[ordinal/total]`, once per submission.
    pub(crate) fn mark(&self, boundary: &BatchBoundary, documents: usize) {
        let marker = format!("[{}/{}]", boundary.ordinal, boundary.total_batches);
        info!("📦 {} submitting {} documents", marker, documents);
        self.progress_bar.set_message(marker);
        self.progress_bar.inc(1);
    }

    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }
}
