//! Path sanitizer: turns media URLs into safe on-disk names.
//!
//! # What it does
//! 1. Derives the file extension from a URL (query / fragment stripped,
//!    lower-cased, `.jpg` when the URL carries none).
//! 2. Derives a post id from an image URL (`…/abc.jpeg?12345` → `12345`).
//! 3. Sanitises a filename:
//!    - Replaces characters that are illegal on macOS, Linux or Windows.
//!    - Trims leading / trailing spaces and dots.
//!    - Caps the length while keeping the extension.
//!    - Falls back to `"download"` if nothing usable remains.
//!
//! No collision avoidance is done here: the destination path doubles as the
//! dedup key, so the same post must always map to the same name.

use std::path::Path;

/// Extension assumed for URLs that do not carry one.
pub const DEFAULT_EXTENSION: &str = ".jpg";

const MAX_FILENAME_BYTES: usize = 200;

// ---------------------------------------------------------------------------
// URL helpers
// ---------------------------------------------------------------------------

/// Extension of the last URL path segment, lower-case with a leading dot.
pub fn extension_from_url(url: &str) -> String {
    let name = filename_from_url(url);
    let ext = Path::new(&name)
        .extension()
        .map(|e| sanitise_ext(&e.to_string_lossy()))
        .unwrap_or_default();

    if ext.is_empty() {
        DEFAULT_EXTENSION.to_string()
    } else {
        format!(".{}", ext)
    }
}

/// Last non-empty path segment of a URL (query / fragment stripped).
pub fn filename_from_url(url: &str) -> String {
    strip_query(url)
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("download")
        .to_string()
}

/// The name of `url`'s last segment without its extension.
pub fn stem_from_url(url: &str) -> String {
    let name = filename_from_url(url);
    Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(name)
}

/// Image URLs on the site carry the post id as their query string
/// (`…/images/1234/abcdef.jpeg?5678901`). Falls back to the file stem.
pub fn id_from_image_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    if let Some((_, query)) = without_fragment.split_once('?') {
        if !query.is_empty() {
            return query.to_string();
        }
    }
    stem_from_url(url)
}

fn strip_query(url: &str) -> &str {
    let url = url.split('?').next().unwrap_or(url);
    url.split('#').next().unwrap_or(url)
}

// ---------------------------------------------------------------------------
// Filename sanitisation
// ---------------------------------------------------------------------------

fn is_illegal_char(c: char) -> bool {
    c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
}

/// Replace illegal characters with `_`, trim spaces and dots, and cap the
/// length at 200 bytes, truncating the stem rather than the extension.
pub fn sanitise_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if is_illegal_char(c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');

    if trimmed.is_empty() {
        return "download".to_string();
    }
    if trimmed.len() <= MAX_FILENAME_BYTES {
        return trimmed.to_string();
    }

    let (stem, ext) = split_stem_ext(trimmed);
    let ext = if ext.is_empty() { String::new() } else { format!(".{}", ext) };
    let stem = truncate_to_bytes(&stem, MAX_FILENAME_BYTES.saturating_sub(ext.len()));
    format!("{}{}", stem, ext)
}

/// Split a filename into `(stem, extension)`.
fn split_stem_ext(name: &str) -> (String, String) {
    let p = Path::new(name);
    let ext = p
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = p
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    (stem, ext)
}

/// Lowercase, alphanumeric only, max 10 chars.
fn sanitise_ext(ext: &str) -> String {
    ext.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(10)
        .collect::<String>()
        .to_lowercase()
}

/// Truncate `s` to at most `max_bytes` UTF-8 bytes, respecting char boundaries.
fn truncate_to_bytes(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
