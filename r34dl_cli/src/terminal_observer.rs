use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};

use r34dl_core::progress::{ProgressObserver, ProgressSnapshot};

/// Renders acquisition progress as a single indicatif bar counting processed
/// items against the requested quantity.
pub struct TerminalProgressObserver {
    bar: ProgressBar,
}

impl TerminalProgressObserver {
    pub fn new(quantity: usize) -> Self {
        let bar = ProgressBar::new(quantity.max(1) as u64);
        bar.set_style(bar_style());
        Self { bar }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "Downloading... [{bar:50.cyan/blue}] {pos}/{len} ({per_sec}) ETA {eta} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=>-")
}

#[async_trait]
impl ProgressObserver for TerminalProgressObserver {
    async fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_length(snapshot.quantity.max(1) as u64);
        self.bar.set_position(snapshot.processed as u64);
        if snapshot.failed > 0 {
            self.bar.set_message(format!("{} failed", snapshot.failed));
        }
    }

    async fn on_complete(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_position(snapshot.processed as u64);
        self.bar.finish_with_message(format!(
            "done: {} downloaded, {} skipped, {} failed",
            snapshot.downloaded, snapshot.skipped, snapshot.failed
        ));
    }

    async fn on_error(&self, error: &str) {
        self.bar.abandon_with_message(format!("Failed: {}", error));
    }
}
