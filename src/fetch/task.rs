//! Value types for fetch work units and their outcomes.

use std::path::PathBuf;
use std::time::Duration;

use crate::ledger::FailureRecord;

use super::FetchError;

/// One `(label, url)` input pair, as produced by the input parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Optional source label (e.g. the manifest FILENAME column).
    pub label: Option<String>,
    /// Absolute URL to fetch.
    pub url: String,
}

impl SourceEntry {
    /// Creates an unlabeled entry.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            label: None,
            url: url.into(),
        }
    }

    /// Creates a labeled entry.
    #[must_use]
    pub fn labeled(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            url: url.into(),
        }
    }

    /// Document identifier for grouping and output naming: the label with
    /// its extension stripped, falling back to the URL basename.
    #[must_use]
    pub fn document_id(&self) -> String {
        let base = self
            .label
            .as_deref()
            .filter(|label| !label.trim().is_empty())
            .map(std::string::ToString::to_string)
            .or_else(|| {
                url::Url::parse(&self.url)
                    .ok()
                    .as_ref()
                    .and_then(super::filename::filename_from_url)
            })
            .unwrap_or_else(|| "document".to_string());
        super::filename::sanitize_filename(super::filename::strip_extension(&base))
    }
}

/// One unit of fetch work: a single HTTP retrieval of one URL.
///
/// Immutable once created; created by the batch runner or page prober and
/// consumed exactly once by the fetcher.
#[derive(Debug, Clone)]
pub struct FetchTask {
    /// URL to fetch.
    pub url: String,
    /// Source label carried into failure records.
    pub label: Option<String>,
    /// Preferred output filename; overrides header/URL-derived names.
    pub filename_hint: Option<String>,
    /// Page index within a paginated document (1 for single-page items).
    pub page_index: u32,
    /// Per-task timeout; `None` uses the fetcher default.
    pub timeout: Option<Duration>,
}

impl FetchTask {
    /// Creates a task for `url` with defaults (page 1, no hint, default timeout).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: None,
            filename_hint: None,
            page_index: 1,
            timeout: None,
        }
    }

    /// Creates a task from a source entry, carrying its label.
    #[must_use]
    pub fn from_entry(entry: &SourceEntry) -> Self {
        Self {
            url: entry.url.clone(),
            label: entry.label.clone(),
            filename_hint: None,
            page_index: 1,
            timeout: None,
        }
    }

    /// Sets the source label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the preferred output filename.
    #[must_use]
    pub fn with_filename_hint(mut self, hint: impl Into<String>) -> Self {
        self.filename_hint = Some(hint.into());
        self
    }

    /// Sets the page index.
    #[must_use]
    pub fn with_page_index(mut self, page_index: u32) -> Self {
        self.page_index = page_index;
        self
    }

    /// Sets a per-task timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the failure record for this task from a fetch error.
    #[must_use]
    pub fn failure(&self, error: &FetchError) -> FailureRecord {
        FailureRecord::fetch(
            self.label.clone(),
            self.url.clone(),
            self.page_index,
            error.status(),
            error.detail(),
            error.to_string(),
        )
    }
}

/// Result of one fetch: the persisted path on success, a ledger-ready
/// failure record otherwise. The fetcher never returns anything else.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The resource was streamed to disk.
    Success {
        /// Path the body was written to.
        path: PathBuf,
        /// The response Content-Type (may be empty).
        content_type: String,
    },
    /// The fetch failed; the record is ready for the ledger.
    Failure(FailureRecord),
}

impl FetchOutcome {
    /// Returns true for successful fetches.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the output path for successful fetches.
    #[must_use]
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Success { path, .. } => Some(path),
            Self::Failure(_) => None,
        }
    }

    /// Consumes the outcome, returning the failure record if any.
    #[must_use]
    pub fn into_failure(self) -> Option<FailureRecord> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure),
        }
    }
}
