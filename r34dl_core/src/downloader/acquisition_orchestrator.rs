use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::downloader::file_classifier::{classify, DownloadPolicy};
use crate::downloader::single_file_downloader::{RetryPolicy, SingleFileDownloader};
use crate::downloader::strategy::retrieval_strategy::RetrievalStrategy;
use crate::progress::notifier::ProgressNotifier;
use crate::progress::observer::ProgressObserver;
use crate::types::types::{
    DownloadError, DownloadOutcome, DownloadStats, ItemDescriptor, MediaCategory, ProgressEvent,
    Quota, Retrieved, TagQuery,
};

/// Drives a retrieval strategy to completion: classifies every item,
/// applies the download policy, downloads into
/// `<output_dir>/{Images,Gif,Video}/`, and keeps the run statistics.
///
/// Items are handled strictly one after another.
pub struct AcquisitionOrchestrator {
    downloader: SingleFileDownloader,
    policy: DownloadPolicy,
    retry: RetryPolicy,
    output_dir: PathBuf,
    notifier: ProgressNotifier,
}

impl AcquisitionOrchestrator {
    pub fn new(
        downloader: SingleFileDownloader,
        policy: DownloadPolicy,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloader,
            policy,
            retry: RetryPolicy::default(),
            output_dir: output_dir.into(),
            notifier: ProgressNotifier::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn policy(&self) -> &DownloadPolicy {
        &self.policy
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Register a progress observer. Must be called before `run()`.
    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) {
        self.notifier.add_observer(observer);
    }

    /// Where `item` is stored: `<output_dir>/<category dir>/<id><ext>`.
    pub fn destination_for(&self, item: &ItemDescriptor) -> PathBuf {
        self.output_dir
            .join(item.category().directory())
            .join(item.file_name())
    }

    /// Acquire up to `quantity` items for `query` from `strategy`.
    ///
    /// Stops when `quantity` items are Downloaded or Skipped, or when the
    /// strategy runs dry; a short run is not an error. Page-level fetch
    /// failures and directory-creation failures abort with `Err` and no
    /// statistics; observers get `on_error` in that case.
    pub async fn run(
        &mut self,
        query: &TagQuery,
        quantity: usize,
        strategy: &dyn RetrievalStrategy,
    ) -> Result<DownloadStats, DownloadError> {
        let (progress_tx, progress_rx) = mpsc::channel(256);

        // Take the notifier out so it can move into the background task.
        let notifier = std::mem::replace(&mut self.notifier, ProgressNotifier::new());
        let notifier_handle = tokio::spawn(async move {
            notifier.run(progress_rx).await;
        });

        let result = self.acquire(query, quantity, strategy, &progress_tx).await;

        if let Err(e) = &result {
            log::error!("[acquisition] tags='{}': run aborted: {}", query, e);
            let _ = progress_tx.send(Err(e.to_string())).await;
        }

        // Closing the channel lets the notifier call on_complete and exit.
        drop(progress_tx);
        let _ = notifier_handle.await;

        result
    }

    async fn acquire(
        &self,
        query: &TagQuery,
        quantity: usize,
        strategy: &dyn RetrievalStrategy,
        progress_tx: &mpsc::Sender<Result<ProgressEvent, String>>,
    ) -> Result<DownloadStats, DownloadError> {
        let mut stats = DownloadStats::new(quantity);
        if quantity == 0 {
            return Ok(stats);
        }

        log::info!(
            "[acquisition] tags='{}': acquiring {} items into {} ({})",
            query,
            quantity,
            self.output_dir.display(),
            self.policy.describe()
        );

        let quota = Quota::new(quantity);
        let mut items = strategy.produce(query, quota.clone());

        while let Some(next) = items.next().await {
            let (item_id, category, outcome) = match next? {
                Retrieved::Item(item) => {
                    let (category, outcome) = self.process(&item).await?;
                    (item.id, category, outcome)
                }
                Retrieved::Unresolved { reference, reason } => {
                    log::warn!("[acquisition] {}: unresolved: {}", reference, reason);
                    (reference, MediaCategory::Unknown, DownloadOutcome::Failed { reason })
                }
            };

            stats.record(category, &outcome);
            if outcome.is_processed() {
                quota.record_processed();
            }

            let _ = progress_tx
                .send(Ok(ProgressEvent {
                    item_id,
                    processed: stats.processed(),
                    quantity,
                    outcome,
                }))
                .await;

            if stats.processed() >= quantity {
                break;
            }
        }

        if stats.processed() < quantity {
            log::info!(
                "[acquisition] tags='{}': source exhausted after {} of {} items",
                query,
                stats.processed(),
                quantity
            );
        }

        Ok(stats)
    }

    async fn process(
        &self,
        item: &ItemDescriptor,
    ) -> Result<(MediaCategory, DownloadOutcome), DownloadError> {
        let category = classify(&item.extension);
        if !self.policy.allows(category) {
            log::debug!(
                "[acquisition] item={}: {:?} disabled by policy",
                item.id,
                category
            );
            return Ok((category, DownloadOutcome::Disabled));
        }

        let destination = self.destination_for(item);
        let outcome = self
            .downloader
            .download_with_retry(item.download_url(), &destination, &self.retry)
            .await?;
        Ok((category, outcome))
    }
}
