use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::downloader::file_classifier::DownloadPolicy;
use crate::types::types::DownloadError;

/// Environment variable that overrides the settings file location.
pub const CONFIG_ENV: &str = "R34DL_CONFIG";

/// Persisted defaults for the CLI. Read once at startup; command-line flags
/// override individual fields for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default number of items to acquire.
    pub limit: u16,
    pub images: bool,
    pub gif: bool,
    pub video: bool,
    /// Structured feed when true, markup scraping otherwise.
    pub is_api: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            limit: 100,
            images: true,
            gif: true,
            video: true,
            is_api: true,
        }
    }
}

impl Settings {
    /// `$R34DL_CONFIG` → `<config dir>/r34dl/config.toml` → `./r34dl.toml`.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs_next::config_dir()
            .map(|dir| dir.join("r34dl").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("r34dl.toml"))
    }

    /// Load `path`, writing defaults there first if it does not exist yet.
    /// A failure to write the defaults is logged and the defaults are used.
    pub fn load_or_init(path: &Path) -> Result<Self, DownloadError> {
        if path.exists() {
            return Self::load(path);
        }

        let settings = Self::default();
        if let Err(e) = settings.save(path) {
            log::warn!("[settings] could not write defaults to {}: {}", path.display(), e);
        }
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, DownloadError> {
        let raw = std::fs::read_to_string(path).map_err(DownloadError::Disk)?;
        toml::from_str(&raw)
            .map_err(|e| DownloadError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<(), DownloadError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(DownloadError::Disk)?;
        }
        let raw = toml::to_string_pretty(self)
            .map_err(|e| DownloadError::Config(e.to_string()))?;
        std::fs::write(path, raw).map_err(DownloadError::Disk)
    }

    pub fn policy(&self) -> DownloadPolicy {
        DownloadPolicy {
            images: self.images,
            gifs: self.gif,
            videos: self.video,
        }
    }
}
