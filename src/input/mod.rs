//! Input parsing: flat URL lists and tabular manifests.
//!
//! Two source formats feed the pipeline:
//!
//! - flat text, one URL per line (blank lines and `#` comments skipped);
//! - a tabular manifest with `FILENAME` and `PREVIEW_URL` columns, where
//!   preview URLs may be relative and are resolved against a base URL.
//!
//! Unparseable lines are collected for logging, not fatal; a source that
//! yields no entries at all is the systemic error that aborts a run.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::fetch::SourceEntry;

/// Manifest column carrying the document label.
const FILENAME_COLUMN: &str = "FILENAME";

/// Manifest column carrying the (possibly relative) resource URL.
const PREVIEW_URL_COLUMN: &str = "PREVIEW_URL";

/// Errors reading or interpreting an input source.
#[derive(Debug, Error)]
pub enum InputError {
    /// The source file could not be read.
    #[error("cannot read input {path}: {source}")]
    Io {
        /// The unreadable path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A required manifest column is missing.
    #[error("required column '{column}' not found in manifest")]
    MissingColumn {
        /// The missing column name.
        column: String,
    },

    /// The source parsed but produced zero usable entries.
    #[error("no usable entries found in {path}")]
    Empty {
        /// The source path.
        path: PathBuf,
    },
}

impl InputError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Parsed entries plus the lines that had to be skipped.
#[derive(Debug, Default)]
pub struct ParsedSource {
    /// Usable `(label, url)` entries in input order.
    pub entries: Vec<SourceEntry>,
    /// Input lines that could not be interpreted (for logging).
    pub skipped: Vec<String>,
}

impl ParsedSource {
    /// Returns true when no entries were parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of parsed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[allow(clippy::expect_used)]
fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^https?://\S+$").expect("static URL pattern is valid"))
}

/// Parses flat text, one URL per line.
///
/// Blank lines and `#` comments are skipped silently; other non-URL lines
/// are collected in `skipped`.
#[must_use]
pub fn parse_url_lines(text: &str) -> ParsedSource {
    let mut result = ParsedSource::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if url_pattern().is_match(line) && Url::parse(line).is_ok() {
            result.entries.push(SourceEntry::new(line));
        } else {
            result.skipped.push(line.to_string());
        }
    }
    debug!(
        entries = result.entries.len(),
        skipped = result.skipped.len(),
        "parsed URL lines"
    );
    result
}

/// Reads and parses a flat URL-list file.
///
/// # Errors
///
/// Returns [`InputError::Io`] when the file cannot be read and
/// [`InputError::Empty`] when it yields no usable URLs.
pub fn read_url_file(path: &Path) -> Result<ParsedSource, InputError> {
    let text = std::fs::read_to_string(path).map_err(|e| InputError::io(path, e))?;
    let parsed = parse_url_lines(&text);
    for skipped in &parsed.skipped {
        warn!(line = %skipped, "skipped unrecognized input line");
    }
    if parsed.is_empty() {
        return Err(InputError::Empty {
            path: path.to_path_buf(),
        });
    }
    info!(path = %path.display(), urls = parsed.len(), "read URL file");
    Ok(parsed)
}

/// Parses a tabular manifest with `FILENAME` and `PREVIEW_URL` columns.
///
/// Relative preview URLs are resolved against `base_url`; rows with an
/// empty preview cell are skipped. Column order is free and extra columns
/// are ignored.
///
/// # Errors
///
/// Returns [`InputError::MissingColumn`] when a required column is absent.
pub fn parse_manifest(text: &str, base_url: &Url) -> Result<ParsedSource, InputError> {
    let mut lines = text.lines();
    let header = lines.next().unwrap_or_default();
    let columns = split_row(header);

    let filename_index = column_index(&columns, FILENAME_COLUMN)?;
    let preview_index = column_index(&columns, PREVIEW_URL_COLUMN)?;

    let mut result = ParsedSource::default();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_row(line);
        let label = fields.get(filename_index).cloned().unwrap_or_default();
        let preview = fields.get(preview_index).cloned().unwrap_or_default();

        if preview.is_empty() {
            result.skipped.push(line.to_string());
            continue;
        }
        match base_url.join(&preview) {
            Ok(resolved) => {
                let entry = if label.is_empty() {
                    SourceEntry::new(resolved)
                } else {
                    SourceEntry::labeled(label, resolved)
                };
                result.entries.push(entry);
            }
            Err(_) => result.skipped.push(line.to_string()),
        }
    }

    info!(
        entries = result.entries.len(),
        skipped = result.skipped.len(),
        "parsed manifest"
    );
    Ok(result)
}

/// Reads and parses a manifest file.
///
/// # Errors
///
/// Returns [`InputError::Io`] when the file cannot be read,
/// [`InputError::MissingColumn`] for a malformed header, and
/// [`InputError::Empty`] when no rows are usable.
pub fn read_manifest(path: &Path, base_url: &Url) -> Result<ParsedSource, InputError> {
    let text = std::fs::read_to_string(path).map_err(|e| InputError::io(path, e))?;
    let parsed = parse_manifest(&text, base_url)?;
    for skipped in &parsed.skipped {
        warn!(line = %skipped, "skipped manifest row");
    }
    if parsed.is_empty() {
        return Err(InputError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(parsed)
}

/// Writes the resolved URL list, one per line.
///
/// # Errors
///
/// Returns [`InputError::Io`] on write failure.
pub fn write_url_list(entries: &[SourceEntry], path: &Path) -> Result<(), InputError> {
    let mut body = String::new();
    for entry in entries {
        body.push_str(&entry.url);
        body.push('\n');
    }
    write_with_parents(path, &body)
}

/// Writes the label-to-URL map as a two-column CSV.
///
/// # Errors
///
/// Returns [`InputError::Io`] on write failure.
pub fn write_url_map(entries: &[SourceEntry], path: &Path) -> Result<(), InputError> {
    let mut body = format!("{FILENAME_COLUMN},FULL_URL\n");
    for entry in entries {
        body.push_str(&format!(
            "{},{}\n",
            quote_field(entry.label.as_deref().unwrap_or_default()),
            quote_field(&entry.url)
        ));
    }
    write_with_parents(path, &body)
}

fn write_with_parents(path: &Path, body: &str) -> Result<(), InputError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| InputError::io(parent, e))?;
    }
    std::fs::write(path, body).map_err(|e| InputError::io(path, e))?;
    info!(path = %path.display(), "wrote url listing");
    Ok(())
}

fn column_index(columns: &[String], wanted: &str) -> Result<usize, InputError> {
    columns
        .iter()
        .position(|column| column.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| InputError::MissingColumn {
            column: wanted.to_string(),
        })
}

/// Splits one delimited row, honoring double-quoted fields with embedded
/// commas and doubled-quote escapes.
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current = String::new();
            }
            c => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn quote_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
