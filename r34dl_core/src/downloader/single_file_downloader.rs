use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::types::types::{DownloadError, DownloadOutcome};

/// Per-request transport timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const USER_AGENT: &str = concat!("r34dl/", env!("CARGO_PKG_VERSION"));

/// Builds the HTTP client shared by the downloader and both retrieval
/// strategies.
pub fn build_client() -> Result<Client, DownloadError> {
    Ok(Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Exponential backoff: the wait after failed attempt `n` (0-based) is
/// `base_delay * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Fetches one URL to one destination path.
///
/// The destination path is the dedup ledger: if it exists, the item is
/// `Skipped` without touching the network. Bodies are streamed into a
/// sibling `.part` file and renamed into place only once complete, so a
/// failed transfer never leaves a file at the destination.
#[derive(Debug, Clone)]
pub struct SingleFileDownloader {
    client: Client,
}

impl SingleFileDownloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Single attempt.
    ///
    /// Returns `Err` only when the destination directory cannot be created;
    /// transport and write failures come back as `DownloadOutcome::Failed`.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<DownloadOutcome, DownloadError> {
        if tokio::fs::metadata(destination).await.is_ok() {
            log::debug!(
                "[file_downloader] {}: already present, skipping",
                destination.display()
            );
            return Ok(DownloadOutcome::Skipped);
        }

        if let Some(dir) = destination.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(DownloadError::Disk)?;
        }

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("[file_downloader] {}: request failed: {}", url, e);
                return Ok(DownloadOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            log::warn!("[file_downloader] {}: bad status {}", url, status);
            return Ok(DownloadOutcome::Failed {
                reason: format!("bad status: {}", status),
            });
        }

        let part_path = partial_path(destination);
        let written = match stream_to_file(response, &part_path).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                log::warn!("[file_downloader] {}: transfer aborted: {}", url, e);
                return Ok(DownloadOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        };

        if let Err(e) = tokio::fs::rename(&part_path, destination).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Ok(DownloadOutcome::Failed {
                reason: format!("failed to move {} into place: {}", part_path.display(), e),
            });
        }

        log::info!(
            "[file_downloader] {}: saved {} bytes to {}",
            url,
            written,
            destination.display()
        );
        Ok(DownloadOutcome::Downloaded)
    }

    /// Retries `Failed` attempts with exponential backoff. `Skipped` and
    /// `Downloaded` return immediately.
    pub async fn download_with_retry(
        &self,
        url: &str,
        destination: &Path,
        retry: &RetryPolicy,
    ) -> Result<DownloadOutcome, DownloadError> {
        let mut attempt: u32 = 0;
        loop {
            let outcome = self.download(url, destination).await?;
            match outcome {
                DownloadOutcome::Failed { ref reason } if attempt < retry.max_retries => {
                    let delay = retry.delay_for(attempt);
                    log::info!(
                        "[file_downloader] {}: attempt {} failed ({}), retrying in {:?}",
                        url,
                        attempt + 1,
                        reason,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return Ok(other),
            }
        }
    }
}

/// `<destination>.<uuid>.part` next to the final file.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.part", Uuid::new_v4().simple()));
    destination.with_file_name(name)
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64, DownloadError> {
    let file = tokio::fs::File::create(path)
        .await
        .map_err(DownloadError::Disk)?;
    let mut writer = tokio::io::BufWriter::with_capacity(256 * 1024, file);

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await.map_err(DownloadError::Disk)?;
        written += chunk.len() as u64;
    }

    writer.flush().await.map_err(DownloadError::Disk)?;
    Ok(written)
}
