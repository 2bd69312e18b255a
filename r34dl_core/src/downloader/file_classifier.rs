use serde::{Deserialize, Serialize};

use crate::types::types::{DownloadError, MediaCategory};

/// Maps an extension (with or without the leading dot, any case) to its
/// media category. Total: anything unrecognised is `Unknown`.
pub fn classify(extension: &str) -> MediaCategory {
    let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "mp4" | "webm" | "avi" | "mov" => MediaCategory::Video,
        "gif" => MediaCategory::Gif,
        "jpg" | "jpeg" | "png" | "webp" | "bmp" => MediaCategory::Image,
        _ => MediaCategory::Unknown,
    }
}

/// Per-category on/off switches for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadPolicy {
    pub images: bool,
    pub gifs: bool,
    pub videos: bool,
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self {
            images: true,
            gifs: true,
            videos: true,
        }
    }
}

impl DownloadPolicy {
    /// Unknown extensions are governed by the image switch.
    pub fn allows(&self, category: MediaCategory) -> bool {
        match category {
            MediaCategory::Image | MediaCategory::Unknown => self.images,
            MediaCategory::Gif => self.gifs,
            MediaCategory::Video => self.videos,
        }
    }

    pub fn ensure_any_enabled(&self) -> Result<(), DownloadError> {
        if self.images || self.gifs || self.videos {
            Ok(())
        } else {
            Err(DownloadError::Validation(
                "at least one file type must be enabled (images, gifs, or videos)".to_string(),
            ))
        }
    }

    /// Human-readable list of enabled types, e.g. `"images, videos"`.
    pub fn describe(&self) -> String {
        let mut types = Vec::new();
        if self.images {
            types.push("images");
        }
        if self.gifs {
            types.push("gifs");
        }
        if self.videos {
            types.push("videos");
        }
        if types.is_empty() {
            "none".to_string()
        } else {
            types.join(", ")
        }
    }
}
