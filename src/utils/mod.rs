pub mod resolver;

pub use resolver::{is_image_url, resolve};

use std::path::Path;

use url::Url;

use crate::domain::{AppError, Result};

pub const DEFAULT_PREFIX: &str = "image";

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Blank prefixes fall back to [`DEFAULT_PREFIX`].
pub fn effective_prefix(prefix: &str) -> &str {
    let trimmed = prefix.trim();
    if trimmed.is_empty() {
        DEFAULT_PREFIX
    } else {
        trimmed
    }
}

/// Map a content type onto a file extension, defaulting to `.jpg`.
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("jpeg") || content_type.contains("jpg") {
        ".jpg"
    } else if content_type.contains("png") {
        ".png"
    } else if content_type.contains("gif") {
        ".gif"
    } else if content_type.contains("webp") {
        ".webp"
    } else if content_type.contains("bmp") {
        ".bmp"
    } else if content_type.contains("svg") {
        ".svg"
    } else {
        ".jpg"
    }
}

/// Build the sanitized target filename for a downloaded image.
///
/// `<prefix>_<basename>` when the URL path ends in a name with an extension,
/// `<prefix>_<ordinal><ext>` otherwise.
pub fn image_filename(url: &str, content_type: &str, prefix: &str, ordinal: usize) -> String {
    let prefix = effective_prefix(prefix);
    let basename = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default();

    let name = match basename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{}_{}.{}", prefix, stem, ext.to_ascii_lowercase())
        }
        _ => format!(
            "{}_{}{}",
            prefix,
            ordinal,
            extension_for_content_type(content_type)
        ),
    };
    sanitize_filename(&name)
}

/// Read page URLs from a text file, one per line, skipping blank lines.
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::Input(format!("Failed to read {}: {}", path.display(), e)))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        return Err(AppError::Input(format!(
            "No URLs found in {}",
            path.display()
        )));
    }
    Ok(urls)
}
