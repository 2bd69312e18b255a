use async_trait::async_trait;

use super::snapshot::ProgressSnapshot;

/// Trait for anything that wants to observe acquisition progress.
///
/// The `ProgressNotifier` calls these methods on all registered observers
/// after folding raw `ProgressEvent`s into a `ProgressSnapshot`.
///
/// Lifecycle:
/// - `on_progress` is called once per item, whatever its outcome.
/// - `on_complete` is called once when the run finishes, including runs
///   that stopped early because the source ran out of items.
/// - `on_error` is called once when the run aborts.
#[async_trait]
pub trait ProgressObserver: Send + Sync + 'static {
    async fn on_progress(&self, snapshot: &ProgressSnapshot);

    async fn on_complete(&self, snapshot: &ProgressSnapshot);

    async fn on_error(&self, error: &str);
}

/// Adapts a plain `(processed, quantity)` callback into an observer.
pub struct CallbackObserver<F> {
    callback: F,
}

impl<F> CallbackObserver<F>
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> ProgressObserver for CallbackObserver<F>
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    async fn on_progress(&self, snapshot: &ProgressSnapshot) {
        (self.callback)(snapshot.processed, snapshot.quantity);
    }

    async fn on_complete(&self, _snapshot: &ProgressSnapshot) {}

    async fn on_error(&self, _error: &str) {}
}
