//! Filename derivation, sanitization, and path resolution for fetched files.
//!
//! Output names are derived by priority: explicit hint, Content-Disposition
//! header, URL basename, and finally a synthetic name from a stable hash of
//! the URL. Paginated documents get a `_page{N}` suffix spliced in before
//! the extension.

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use url::Url;

/// Known content types and their canonical file extensions.
///
/// The table is advisory: an unrecognized content type logs a warning but
/// the payload is still persisted.
const CONTENT_TYPE_TABLE: &[(&str, &str)] = &[
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("image/webp", ".webp"),
    ("image/tiff", ".tiff"),
    ("image/bmp", ".bmp"),
    ("image/svg+xml", ".svg"),
    ("application/pdf", ".pdf"),
];

/// Strips parameters and normalizes a Content-Type header value.
fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

/// Returns true when the content type looks like an image or PDF payload.
#[must_use]
pub fn is_known_content_type(content_type: &str) -> bool {
    let mime = normalize_content_type(content_type);
    mime.starts_with("image/") || CONTENT_TYPE_TABLE.iter().any(|(known, _)| *known == mime)
}

/// Best-guess extension for a content type, `.img` when unknown.
#[must_use]
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    let mime = normalize_content_type(content_type);
    CONTENT_TYPE_TABLE
        .iter()
        .find(|(known, _)| *known == mime)
        .map_or(".img", |(_, ext)| ext)
}

/// Parses a Content-Disposition header to extract the filename.
///
/// Handles:
/// - `attachment; filename="example.png"`
/// - `attachment; filename=example.png`
/// - `attachment; filename*=UTF-8''example.png` (RFC 5987)
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    // RFC 5987 encoded form wins when present
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();
        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

/// Extracts the last non-empty path segment of a URL, percent-decoded.
pub(crate) fn filename_from_url(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    let last = segments.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| last.to_string());
    let sanitized = sanitize_filename(&decoded);
    (!sanitized.trim_matches('_').is_empty()).then_some(sanitized)
}

/// Synthetic filename from a stable hash of the URL plus a content-type
/// extension. Used when neither headers nor the URL yield a usable name.
#[must_use]
pub fn synthetic_filename(url: &str, content_type: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let prefix = hex::encode(&digest[..6]);
    format!("download_{prefix}{}", extension_for_content_type(content_type))
}

/// Splices `_page{N}` in before the extension for page indexes above 1.
///
/// `scan.png` at page 3 becomes `scan_page3.png`; names without an extension
/// get the suffix appended.
#[must_use]
pub fn apply_page_suffix(name: &str, page: u32) -> String {
    if page <= 1 {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(pos) if pos > 0 => format!("{}_page{page}{}", &name[..pos], &name[pos..]),
        _ => format!("{name}_page{page}"),
    }
}

/// Returns true when the name carries a file extension.
#[must_use]
pub fn has_extension(name: &str) -> bool {
    matches!(name.rfind('.'), Some(pos) if pos > 0 && pos + 1 < name.len())
}

/// Strips the final extension from a name, if any.
#[must_use]
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    }
}

/// Sanitizes a filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems and rewrites
/// dot-only segments so the result can never escape the output directory.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Resolves a unique file path, adding a numeric suffix if the file exists.
///
/// Collisions between documents are disambiguated, never overwritten:
/// `scan.png`, then `scan_1.png`, `scan_2.png`, ...
pub(crate) fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let filename = {
        let sanitized = sanitize_filename(filename);
        if sanitized.contains('/')
            || sanitized.contains('\\')
            || sanitized.trim_matches('_').is_empty()
        {
            "download.bin".to_string()
        } else {
            sanitized
        }
    };
    let base_path = dir.join(&filename);

    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) => (&filename[..pos], &filename[pos..]),
        None => (filename.as_str(), ""),
    };

    for i in 1..1000 {
        let new_path = dir.join(format!("{stem}_{i}{ext}"));
        if !new_path.exists() {
            return new_path;
        }
    }

    // Fallback (extremely unlikely)
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}
