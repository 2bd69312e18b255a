pub mod acquisition_orchestrator;
pub mod file_classifier;
pub mod single_file_downloader;
pub mod strategy;
