use std::path::Path;
use std::time::Duration;

use r34dl_core::downloader::file_classifier::DownloadPolicy;
use r34dl_core::progress::format_duration;
use r34dl_core::types::types::{DownloadStats, MediaCategory};

pub fn print_summary(stats: &DownloadStats, output_dir: &Path, policy: &DownloadPolicy, elapsed: Duration) {
    println!("\n{}", "=".repeat(50));
    println!("Download Summary:");
    println!("Total requested: {}", stats.total);
    println!("Successfully downloaded: {}", stats.downloaded);
    if stats.failed > 0 {
        println!("Failed: {}", stats.failed);
    }
    if stats.skipped > 0 {
        println!("Skipped (already exists): {}", stats.skipped);
    }
    if stats.disabled > 0 {
        println!("Ignored (file type disabled): {}", stats.disabled);
    }

    if stats.images > 0 || stats.gifs > 0 || stats.videos > 0 {
        println!("\nBy file type:");
        if stats.images > 0 {
            println!("  Images: {}", stats.images);
        }
        if stats.gifs > 0 {
            println!("  GIFs: {}", stats.gifs);
        }
        if stats.videos > 0 {
            println!("  Videos: {}", stats.videos);
        }
    }

    println!("\nFiles saved to: {}", output_dir.display());
    println!("Elapsed: {}", format_duration(elapsed.as_secs_f64()));

    println!("\nFolder structure:");
    for (enabled, category) in [
        (policy.images, MediaCategory::Image),
        (policy.gifs, MediaCategory::Gif),
        (policy.videos, MediaCategory::Video),
    ] {
        if enabled {
            println!("  {}/", output_dir.join(category.directory()).display());
        }
    }
}
