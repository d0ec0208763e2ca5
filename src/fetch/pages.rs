//! Sequential page-index probing for multi-page remote documents.
//!
//! Some archives expose one logical document as N preview images behind a
//! page-index query parameter. The prober walks that index from 1 upward,
//! fetching until the server signals end-of-document (a 404 after at least
//! one page) or an error stops the walk. The resulting page list is gap-free
//! by construction: probing halts at the first miss, so a document can never
//! have pages {1, 3} without page 2.

use std::num::NonZeroU32;
use std::path::PathBuf;

use tracing::{debug, instrument};
use url::Url;

use crate::ledger::FailureRecord;

use super::filename;
use super::{ConcurrencyGate, FetchOutcome, FetchTask, Fetcher, SourceEntry};

/// Default page-index query parameter name.
pub const DEFAULT_PAGE_PARAM: &str = "previewFileIndex";

/// Default upper bound on probed pages per document.
pub const DEFAULT_MAX_PAGES: u32 = 20;

/// Prober configuration: which query parameter selects the page, and how
/// many pages to probe at most.
#[derive(Debug, Clone)]
pub struct PageProber {
    param: String,
    max_pages: NonZeroU32,
}

impl PageProber {
    /// Creates a prober for the given page parameter and page cap.
    #[must_use]
    pub fn new(param: impl Into<String>, max_pages: NonZeroU32) -> Self {
        Self {
            param: param.into(),
            max_pages,
        }
    }

    /// Returns the configured page parameter name.
    #[must_use]
    pub fn param(&self) -> &str {
        &self.param
    }

    /// Returns the configured page cap.
    #[must_use]
    pub fn max_pages(&self) -> u32 {
        self.max_pages.get()
    }

    /// Returns true when the URL carries the page-index parameter.
    #[must_use]
    pub fn is_paged(&self, url: &Url) -> bool {
        url.query_pairs().any(|(key, _)| key == self.param)
    }

    /// Resolves one logical document into its ordered page paths.
    ///
    /// A URL without the page parameter is treated as single-page and
    /// delegated to the fetcher once. Otherwise pages are probed
    /// sequentially; the walk stops at the first failure:
    ///
    /// - 404 after page 1 is the end-of-document signal and records nothing;
    /// - any failure at page 1, or a non-404 failure later, is recorded.
    ///
    /// Returns the fetched page paths (page 1 first, no gaps) and the
    /// failures to ledger. A document whose first page fails contributes
    /// zero pages and one failure record.
    #[instrument(skip(self, fetcher, gate, entry), fields(url = %entry.url))]
    pub async fn resolve(
        &self,
        fetcher: &Fetcher,
        gate: &ConcurrencyGate,
        entry: &SourceEntry,
    ) -> (Vec<PathBuf>, Vec<FailureRecord>) {
        let parsed = match Url::parse(&entry.url) {
            Ok(url) => url,
            Err(_) => {
                let task = FetchTask::from_entry(entry);
                let failure = task.failure(&super::FetchError::invalid_url(entry.url.clone()));
                return (Vec::new(), vec![failure]);
            }
        };

        if !self.is_paged(&parsed) {
            let task = self.page_task(entry, &entry.url, 1);
            return match fetcher.fetch(gate, &task).await {
                FetchOutcome::Success { path, .. } => (vec![path], Vec::new()),
                FetchOutcome::Failure(failure) => (Vec::new(), vec![failure]),
            };
        }

        let mut pages = Vec::new();
        let mut failures = Vec::new();

        for page in 1..=self.max_pages.get() {
            let page_url = rewrite_page_param(&parsed, &self.param, page);
            let task = self.page_task(entry, page_url.as_str(), page);

            match fetcher.fetch(gate, &task).await {
                FetchOutcome::Success { path, .. } => pages.push(path),
                FetchOutcome::Failure(failure) => {
                    if page > 1 && failure.is_not_found() {
                        debug!(page, "end of document");
                    } else {
                        failures.push(failure);
                    }
                    break;
                }
            }
        }

        debug!(pages = pages.len(), failures = failures.len(), "document resolved");
        (pages, failures)
    }

    /// Builds the fetch task for one page, naming files after the document
    /// id so page files group naturally on disk.
    fn page_task(&self, entry: &SourceEntry, url: &str, page: u32) -> FetchTask {
        let mut task = FetchTask::new(url).with_page_index(page);
        if let Some(label) = &entry.label {
            task = task
                .with_label(label.clone())
                .with_filename_hint(filename::strip_extension(label).to_string());
        }
        task
    }
}

impl Default for PageProber {
    fn default() -> Self {
        Self {
            param: DEFAULT_PAGE_PARAM.to_string(),
            max_pages: NonZeroU32::new(DEFAULT_MAX_PAGES).unwrap_or(NonZeroU32::MIN),
        }
    }
}

/// Rewrites the page-index parameter of `url` to `value`, preserving every
/// other query pair in order.
fn rewrite_page_param(url: &Url, param: &str, value: u32) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut rewritten = url.clone();
    {
        let mut editor = rewritten.query_pairs_mut();
        editor.clear();
        for (key, val) in &pairs {
            if key == param {
                editor.append_pair(param, &value.to_string());
            } else {
                editor.append_pair(key, val);
            }
        }
    }
    rewritten
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn prober() -> PageProber {
        PageProber::new("previewFileIndex", NonZeroU32::new(10).unwrap())
    }

    #[test]
    fn test_is_paged_detects_parameter() {
        let prober = prober();
        let paged = Url::parse("https://example.com/doc?id=7&previewFileIndex=1").unwrap();
        let flat = Url::parse("https://example.com/doc?id=7").unwrap();
        assert!(prober.is_paged(&paged));
        assert!(!prober.is_paged(&flat));
    }

    #[test]
    fn test_rewrite_page_param_replaces_value() {
        let url = Url::parse("https://example.com/doc?id=7&previewFileIndex=1&v=2").unwrap();
        let rewritten = rewrite_page_param(&url, "previewFileIndex", 5);
        assert_eq!(
            rewritten.as_str(),
            "https://example.com/doc?id=7&previewFileIndex=5&v=2"
        );
    }

    #[test]
    fn test_rewrite_page_param_preserves_other_pairs() {
        let url = Url::parse("https://example.com/doc?a=1&previewFileIndex=3&b=2").unwrap();
        let rewritten = rewrite_page_param(&url, "previewFileIndex", 9);
        let pairs: Vec<(String, String)> = rewritten
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("previewFileIndex".to_string(), "9".to_string()),
                ("b".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_default_prober_configuration() {
        let prober = PageProber::default();
        assert_eq!(prober.param(), DEFAULT_PAGE_PARAM);
        assert_eq!(prober.max_pages(), DEFAULT_MAX_PAGES);
    }

    #[test]
    fn test_page_task_uses_label_stem_as_hint() {
        let prober = prober();
        let entry = SourceEntry::labeled("Report.pdf", "https://example.com/doc?previewFileIndex=1");
        let task = prober.page_task(&entry, "https://example.com/doc?previewFileIndex=2", 2);
        assert_eq!(task.filename_hint.as_deref(), Some("Report"));
        assert_eq!(task.page_index, 2);
        assert_eq!(task.label.as_deref(), Some("Report.pdf"));
    }
}
