//! Storage key and public path normalization
//!
//! Three representations of the same file exist:
//! - raw paths as written by the upload transport (absolute, relative,
//!   Windows-style, or just a file name)
//! - storage keys persisted on an edition, always `uploads/<file>`
//! - public paths handed to clients, `/uploads/<file>` or an absolute URL
//!
//! Normalization is string-based and total: unrecognized input falls back
//! to being treated as a bare file name under the storage root.

/// Name of the storage root directory; every storage key starts with it.
pub const STORAGE_ROOT: &str = "uploads";

const MARKER: &str = "uploads/";

/// Convert a raw upload path into a canonical storage key.
pub fn to_storage_key(raw: &str) -> String {
    let normalized = strip_query(raw.trim()).replace('\\', "/");

    if let Some(idx) = last_marker_segment(&normalized) {
        return normalized[idx..].to_string();
    }

    let file_name = normalized
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("");

    format!("{MARKER}{file_name}")
}

/// Convert a storage key into the path clients use to fetch the file.
pub fn to_public_path(key: &str) -> String {
    let trimmed = key.trim();
    if is_absolute_url(trimmed) {
        return trimmed.to_string();
    }
    format!("/{}", to_storage_key(trimmed))
}

/// Byte offset of the last `uploads/` occurrence that starts a path segment.
fn last_marker_segment(path: &str) -> Option<usize> {
    path.match_indices(MARKER)
        .map(|(idx, _)| idx)
        .filter(|&idx| idx == 0 || matches!(path.as_bytes()[idx - 1], b'/' | b':'))
        .last()
}

fn strip_query(path: &str) -> &str {
    match path.find(['?', '#']) {
        Some(idx) => &path[..idx],
        None => path,
    }
}

fn is_absolute_url(path: &str) -> bool {
    match path.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        }
        None => false,
    }
}
