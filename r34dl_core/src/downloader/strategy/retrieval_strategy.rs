use std::time::Duration;

use futures::stream::BoxStream;

use crate::types::types::{DownloadError, Quota, Retrieved, TagQuery};

/// Minimum spacing between two emitted items. Every item costs at least one
/// request against the site, so this is the floor on request cadence.
pub const ITEM_DELAY: Duration = Duration::from_millis(100);

/// A lazy, finite sequence of items. An `Err` is a page-level failure: it is
/// the last element of the stream and aborts the run.
pub type ItemStream<'a> = BoxStream<'a, Result<Retrieved, DownloadError>>;

/// The one capability the orchestrator needs from a retrieval backend.
/// Pagination (page index, listing offset) stays inside the implementation.
pub trait RetrievalStrategy: Send + Sync {
    /// Produce items for `query`. `quota` tells the strategy how many items
    /// are still wanted; the consumer advances it as items complete.
    fn produce<'a>(&'a self, query: &'a TagQuery, quota: Quota) -> ItemStream<'a>;
}

/// Sleeps [`ITEM_DELAY`] before every emission but the first.
pub(crate) async fn pace(emitted: usize) {
    if emitted > 0 {
        tokio::time::sleep(ITEM_DELAY).await;
    }
}

/// Site root used when no override is given.
pub const DEFAULT_BASE_URL: &str = "https://rule34.xxx";

pub(crate) fn normalise_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// GET `url` and return the body, treating any non-2xx status as an error.
pub(crate) async fn fetch_text(
    client: &reqwest::Client,
    url: url::Url,
) -> Result<String, DownloadError> {
    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.text().await?)
}
