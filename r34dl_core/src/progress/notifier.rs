use std::time::Instant;

use tokio::sync::mpsc;

use super::observer::ProgressObserver;
use super::snapshot::ProgressSnapshot;
use crate::types::types::{DownloadOutcome, ProgressEvent};

/// EMA smoothing factor. 0.3 = responsive but stable.
const EMA_ALPHA: f64 = 0.3;

/// Consumes `Result<ProgressEvent, String>` from the acquisition channel,
/// folds events into a `ProgressSnapshot`, and fans out to all registered
/// observers.
///
/// # Lifecycle
///
/// | Channel message        | Observer method called          |
/// |------------------------|---------------------------------|
/// | `Ok(ProgressEvent)`    | `on_progress(&snapshot)`        |
/// | `Err(String)`          | `on_error(&msg)` then stops     |
/// | Channel closed (no err)| `on_complete(&final_snapshot)`  |
pub struct ProgressNotifier {
    observers: Vec<Box<dyn ProgressObserver>>,
    snapshot: ProgressSnapshot,
    rate: f64,
    last_update: Instant,
    start_time: Instant,
}

impl Default for ProgressNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressNotifier {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            observers: Vec::new(),
            snapshot: ProgressSnapshot::empty(0),
            rate: 0.0,
            last_update: now,
            start_time: now,
        }
    }

    /// Register an observer. Must be called before `run()`.
    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) {
        self.observers.push(observer);
    }

    /// Consume progress messages until the channel closes or an error arrives.
    pub async fn run(mut self, mut progress_rx: mpsc::Receiver<Result<ProgressEvent, String>>) {
        self.start_time = Instant::now();
        self.last_update = self.start_time;

        while let Some(msg) = progress_rx.recv().await {
            match msg {
                Ok(ev) => {
                    self.handle_event(ev);
                    for observer in &self.observers {
                        observer.on_progress(&self.snapshot).await;
                    }
                }
                Err(error) => {
                    for observer in &self.observers {
                        observer.on_error(&error).await;
                    }
                    return;
                }
            }
        }
        self.finish().await;
    }

    fn handle_event(&mut self, ev: ProgressEvent) {
        let now = Instant::now();
        let snapshot = &mut self.snapshot;

        match ev.outcome {
            DownloadOutcome::Downloaded => snapshot.downloaded += 1,
            DownloadOutcome::Skipped => snapshot.skipped += 1,
            DownloadOutcome::Failed { .. } => snapshot.failed += 1,
            DownloadOutcome::Disabled => snapshot.disabled += 1,
        }
        let advanced = ev.processed.saturating_sub(snapshot.processed);
        snapshot.processed = ev.processed;
        snapshot.quantity = ev.quantity;
        snapshot.last_item = Some(ev.item_id);

        // Rate only moves when an item counts toward the quantity.
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        if advanced > 0 && elapsed > 0.0 {
            let instant_rate = advanced as f64 / elapsed;
            self.rate = if self.rate == 0.0 {
                instant_rate
            } else {
                EMA_ALPHA * instant_rate + (1.0 - EMA_ALPHA) * self.rate
            };
            self.last_update = now;
        }

        let remaining = snapshot.quantity.saturating_sub(snapshot.processed);
        snapshot.items_per_sec = self.rate;
        snapshot.eta_secs = if self.rate > 0.0 {
            remaining as f64 / self.rate
        } else {
            0.0
        };
    }

    /// Finalize: mark the snapshot done with the average rate, notify all observers.
    async fn finish(mut self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        self.snapshot.done = true;
        self.snapshot.eta_secs = 0.0;
        self.snapshot.items_per_sec = if elapsed > 0.0 {
            self.snapshot.processed as f64 / elapsed
        } else {
            0.0
        };

        for observer in &self.observers {
            observer.on_complete(&self.snapshot).await;
        }
    }
}
