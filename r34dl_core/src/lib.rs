pub mod downloader;
pub mod path_sanitizer;
pub mod progress;
pub mod settings;
pub mod types;
