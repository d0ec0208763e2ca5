//! Append-only failure ledger and post-run error reporting.
//!
//! Every per-item failure in a run (a URL that could not be fetched, a page
//! probe that broke off early, an image that would not convert) is captured
//! as a [`FailureRecord`] and appended to the shared [`ErrorLedger`]. At the
//! end of the run the ledger is flushed to a timestamped, human-readable
//! report file. A run with no failures produces no report file.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

/// A single recorded failure from the fetch or conversion phase.
///
/// Records are immutable once created and carry enough context to be
/// actionable on their own: which source the item belonged to, the URL or
/// path involved, the page index for paginated documents, and a short
/// status/detail token alongside the full message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Label of the source this item belonged to (e.g. a manifest filename).
    pub label: Option<String>,
    /// The URL (or local path, for conversion failures) that failed.
    pub url: String,
    /// Page index within a paginated document; 1 for single-page items.
    pub page: u32,
    /// HTTP status code when the failure came from a response status.
    pub status: Option<u16>,
    /// Short machine-friendly detail token ("404", "timeout", "convert", ...).
    pub detail: String,
    /// Full human-readable failure message.
    pub message: String,
}

impl FailureRecord {
    /// Creates a record for a failed fetch.
    #[must_use]
    pub fn fetch(
        label: Option<String>,
        url: impl Into<String>,
        page: u32,
        status: Option<u16>,
        detail: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            label,
            url: url.into(),
            page,
            status,
            detail: detail.into(),
            message: message.into(),
        }
    }

    /// Creates a record for a failed image-to-PDF conversion.
    #[must_use]
    pub fn conversion(path: &Path, message: impl Into<String>) -> Self {
        Self {
            label: None,
            url: path.display().to_string(),
            page: 1,
            status: None,
            detail: "convert".to_string(),
            message: message.into(),
        }
    }

    /// Returns true when this failure was an HTTP 404 response.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(
                f,
                "[{}] page {} {} ({}): {}",
                label, self.page, self.url, self.detail, self.message
            ),
            None => write!(
                f,
                "page {} {} ({}): {}",
                self.page, self.url, self.detail, self.message
            ),
        }
    }
}

/// Thread-safe, append-only collection of [`FailureRecord`]s for one run.
///
/// Append order is not semantically significant; concurrent fetch tasks may
/// interleave their records freely.
#[derive(Debug, Default)]
pub struct ErrorLedger {
    entries: Mutex<Vec<FailureRecord>>,
}

impl ErrorLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one failure record.
    pub fn record(&self, failure: FailureRecord) {
        self.lock().push(failure);
    }

    /// Appends every record from `failures`.
    pub fn merge(&self, failures: impl IntoIterator<Item = FailureRecord>) {
        self.lock().extend(failures);
    }

    /// Returns the number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns a snapshot of the recorded failures.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FailureRecord> {
        self.lock().clone()
    }

    /// Writes all recorded failures to a timestamped report under `dir`.
    ///
    /// Returns the report path, or `None` when no failures were recorded;
    /// in that case nothing is created or truncated on disk.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the report directory or file cannot be written.
    pub fn flush(&self, dir: &Path) -> std::io::Result<Option<PathBuf>> {
        let entries = self.snapshot();
        if entries.is_empty() {
            debug!("no failures recorded, skipping report");
            return Ok(None);
        }

        std::fs::create_dir_all(dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("failures_{stamp}.log"));

        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "{} failure(s) recorded", entries.len())?;
        writeln!(file)?;
        for entry in &entries {
            writeln!(file, "source:  {}", entry.label.as_deref().unwrap_or("-"))?;
            writeln!(file, "url:     {}", entry.url)?;
            writeln!(file, "page:    {}", entry.page)?;
            writeln!(file, "detail:  {}", entry.detail)?;
            writeln!(file, "message: {}", entry.message)?;
            writeln!(file)?;
        }

        info!(path = %path.display(), failures = entries.len(), "failure report written");
        Ok(Some(path))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FailureRecord>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_failure(url: &str) -> FailureRecord {
        FailureRecord::fetch(
            Some("report".to_string()),
            url,
            1,
            Some(500),
            "500",
            format!("HTTP 500 fetching {url}"),
        )
    }

    #[test]
    fn test_record_and_len() {
        let ledger = ErrorLedger::new();
        assert!(ledger.is_empty());

        ledger.record(sample_failure("https://example.com/a.png"));
        ledger.record(sample_failure("https://example.com/b.png"));

        assert_eq!(ledger.len(), 2);
        assert!(!ledger.is_empty());
    }

    #[test]
    fn test_merge_extends_entries() {
        let ledger = ErrorLedger::new();
        ledger.merge(vec![
            sample_failure("https://example.com/a.png"),
            sample_failure("https://example.com/b.png"),
        ]);
        ledger.record(sample_failure("https://example.com/c.png"));
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_flush_empty_ledger_creates_nothing() {
        let ledger = ErrorLedger::new();
        let temp_dir = TempDir::new().unwrap();

        let result = ledger.flush(temp_dir.path()).unwrap();

        assert!(result.is_none());
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert!(entries.is_empty(), "empty flush must not touch the directory");
    }

    #[test]
    fn test_flush_writes_one_block_per_failure() {
        let ledger = ErrorLedger::new();
        ledger.record(sample_failure("https://example.com/a.png"));
        ledger.record(FailureRecord::conversion(
            Path::new("/tmp/bad.png"),
            "unsupported format",
        ));

        let temp_dir = TempDir::new().unwrap();
        let path = ledger.flush(temp_dir.path()).unwrap().unwrap();

        let report = std::fs::read_to_string(&path).unwrap();
        assert!(report.contains("2 failure(s)"));
        assert!(report.contains("https://example.com/a.png"));
        assert!(report.contains("/tmp/bad.png"));
        assert!(report.contains("unsupported format"));
        assert!(report.contains("detail:  500"));
        assert!(report.contains("detail:  convert"));
    }

    #[test]
    fn test_flush_report_name_is_timestamped() {
        let ledger = ErrorLedger::new();
        ledger.record(sample_failure("https://example.com/a.png"));

        let temp_dir = TempDir::new().unwrap();
        let path = ledger.flush(temp_dir.path()).unwrap().unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();

        assert!(name.starts_with("failures_"));
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn test_concurrent_record_is_safe() {
        use std::sync::Arc;
        use std::thread;

        let ledger = Arc::new(ErrorLedger::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(thread::spawn(move || {
                for i in 0..50 {
                    ledger.record(sample_failure(&format!("https://example.com/{i}")));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ledger.len(), 400);
    }

    #[test]
    fn test_failure_record_display_includes_label() {
        let failure = sample_failure("https://example.com/a.png");
        let text = failure.to_string();
        assert!(text.contains("[report]"));
        assert!(text.contains("https://example.com/a.png"));
        assert!(text.contains("500"));
    }

    #[test]
    fn test_is_not_found() {
        let mut failure = sample_failure("https://example.com/a.png");
        assert!(!failure.is_not_found());
        failure.status = Some(404);
        assert!(failure.is_not_found());
    }
}
