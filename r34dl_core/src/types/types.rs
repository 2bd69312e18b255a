use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::downloader::file_classifier::classify;
use crate::path_sanitizer::sanitise_filename;

/// Every failure the acquisition pipeline can surface.
///
/// Per-item transport and parse failures never reach the caller as an
/// `Err`; they are folded into `DownloadOutcome::Failed` or
/// `Retrieved::Unresolved`. What does come back as an `Err` aborts the run.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("disk error: {0}")]
    Disk(std::io::Error),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("config error: {0}")]
    Config(String),
}

/// A validated, whitespace-collapsed list of space-separated tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TagQuery(String);

impl TagQuery {
    /// Trims the input and collapses whitespace runs to single spaces.
    /// Empty or whitespace-only input is rejected.
    pub fn parse(raw: &str) -> Result<Self, DownloadError> {
        let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.is_empty() {
            return Err(DownloadError::Validation("tags cannot be empty".to_string()));
        }
        Ok(Self(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TagQuery {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TagQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaCategory {
    Image,
    Gif,
    Video,
    Unknown,
}

impl MediaCategory {
    /// Output subdirectory. Unknown extensions land next to images.
    pub fn directory(self) -> &'static str {
        match self {
            MediaCategory::Gif => "Gif",
            MediaCategory::Video => "Video",
            MediaCategory::Image | MediaCategory::Unknown => "Images",
        }
    }
}

/// One downloadable post, as discovered by a retrieval strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDescriptor {
    pub id: String,
    pub file_url: String,
    pub sample_url: Option<String>,
    /// Lower-case, with leading dot (e.g. `".jpeg"`).
    pub extension: String,
}

impl ItemDescriptor {
    pub fn new(id: impl Into<String>, file_url: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_url: file_url.into(),
            sample_url: None,
            extension: extension.into(),
        }
    }

    pub fn with_sample_url(mut self, sample_url: impl Into<String>) -> Self {
        let sample_url = sample_url.into();
        self.sample_url = if sample_url.trim().is_empty() {
            None
        } else {
            Some(sample_url)
        };
        self
    }

    pub fn category(&self) -> MediaCategory {
        classify(&self.extension)
    }

    /// Videos are fetched through their sample URL when one exists; the
    /// sample is a smaller transcode of the original.
    pub fn download_url(&self) -> &str {
        match (&self.sample_url, self.category()) {
            (Some(sample), MediaCategory::Video) => sample,
            _ => &self.file_url,
        }
    }

    pub fn file_name(&self) -> String {
        sanitise_filename(&format!("{}{}", self.id, self.extension))
    }
}

/// Element of a retrieval strategy's item sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieved {
    Item(ItemDescriptor),
    /// A post the strategy could not turn into a descriptor (detail page
    /// unreachable, no media element, no file URL). Counts as a failure.
    Unresolved { reference: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DownloadOutcome {
    Downloaded,
    /// The destination file already existed; nothing was fetched.
    Skipped,
    Failed { reason: String },
    /// The item's category is switched off by the download policy.
    Disabled,
}

impl DownloadOutcome {
    /// Whether this outcome counts toward the requested quantity.
    pub fn is_processed(&self) -> bool {
        matches!(self, DownloadOutcome::Downloaded | DownloadOutcome::Skipped)
    }
}

/// Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadStats {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub disabled: usize,
    pub images: usize,
    pub gifs: usize,
    pub videos: usize,
}

impl DownloadStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Items that reached Downloaded or Skipped.
    pub fn processed(&self) -> usize {
        self.downloaded + self.skipped
    }

    pub fn record(&mut self, category: MediaCategory, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded => {
                self.downloaded += 1;
                match category {
                    MediaCategory::Gif => self.gifs += 1,
                    MediaCategory::Video => self.videos += 1,
                    MediaCategory::Image | MediaCategory::Unknown => self.images += 1,
                }
            }
            DownloadOutcome::Skipped => self.skipped += 1,
            DownloadOutcome::Failed { .. } => self.failed += 1,
            DownloadOutcome::Disabled => self.disabled += 1,
        }
    }
}

/// Requested/processed pair shared between the orchestrator and a
/// retrieval strategy. The consumer advances `processed`; the strategy reads
/// `remaining()` to size the next page.
#[derive(Debug, Clone)]
pub struct Quota {
    requested: usize,
    processed: Arc<AtomicUsize>,
}

impl Quota {
    pub fn new(requested: usize) -> Self {
        Self {
            requested,
            processed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.requested.saturating_sub(self.processed())
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::AcqRel);
    }
}

/// Raw progress message sent from the orchestrator to the notifier after
/// every item.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub item_id: String,
    pub processed: usize,
    pub quantity: usize,
    pub outcome: DownloadOutcome,
}
