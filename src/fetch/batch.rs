//! Batch coordination for large fetch runs.
//!
//! Inputs are split into consecutive fixed-size batches. Batches run
//! sequentially relative to each other; every task inside a batch runs
//! concurrently, bounded by the shared [`ConcurrencyGate`]. This caps
//! peak task-creation overhead on very large inputs and gives a natural
//! checkpoint for progress reporting after every batch.
//!
//! Progress is observational only: it is published on a watch channel and
//! never gates control flow.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::ledger::FailureRecord;

use super::{ConcurrencyGate, FetchOutcome, FetchTask, Fetcher, PageProber, SourceEntry};

/// Default number of items per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Error constructing a batch runner.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Batch size must be at least 1.
    #[error("invalid batch size {value}: must be greater than zero")]
    InvalidBatchSize {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Progress snapshot published after every completed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Items completed so far (succeeded or failed).
    pub completed: usize,
    /// Total items in the run.
    pub total: usize,
}

/// Aggregate result of a batch run: one outcome per input entry.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Paths of successfully fetched resources, in completion order.
    pub succeeded: Vec<PathBuf>,
    /// Ledger-ready records for every failed entry.
    pub failures: Vec<FailureRecord>,
}

impl BatchReport {
    /// Total number of outcomes (always equals the input length).
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }

    /// Success rate in percent (100.0 for an empty run).
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            return 100.0;
        }
        self.succeeded.len() as f64 / self.total() as f64 * 100.0
    }
}

/// Pages of resolved documents keyed by document id, page 1 first.
///
/// A document id appears at most once; documents that yielded no pages are
/// absent entirely.
pub type DocumentPageSet = BTreeMap<String, Vec<PathBuf>>;

/// Coordinates fetches over an arbitrarily large input set.
#[derive(Debug)]
pub struct BatchRunner {
    fetcher: Arc<Fetcher>,
    gate: ConcurrencyGate,
    batch_size: usize,
    progress: watch::Sender<Progress>,
}

impl BatchRunner {
    /// Creates a runner splitting work into `batch_size`-item batches.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidBatchSize`] when `batch_size` is zero.
    pub fn new(
        fetcher: Arc<Fetcher>,
        gate: ConcurrencyGate,
        batch_size: usize,
    ) -> Result<Self, BatchError> {
        if batch_size == 0 {
            return Err(BatchError::InvalidBatchSize { value: batch_size });
        }
        let (progress, _) = watch::channel(Progress::default());
        Ok(Self {
            fetcher,
            gate,
            batch_size,
            progress,
        })
    }

    /// Subscribes to progress snapshots for this runner.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Returns the configured batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Fetches every entry, batch by batch.
    ///
    /// Every entry yields exactly one outcome:
    /// `report.succeeded.len() + report.failures.len() == entries.len()`.
    /// Empty input returns an empty report immediately.
    #[instrument(skip(self, entries), fields(total = entries.len()))]
    pub async fn run(&self, entries: &[SourceEntry]) -> BatchReport {
        let total = entries.len();
        let mut report = BatchReport::default();
        if total == 0 {
            return report;
        }

        let started = Instant::now();
        let batch_count = total.div_ceil(self.batch_size);
        let mut completed = 0usize;

        info!(total, batches = batch_count, "starting batch run");

        for (batch_index, batch) in entries.chunks(self.batch_size).enumerate() {
            let mut joins: Vec<(SourceEntry, JoinHandle<FetchOutcome>)> =
                Vec::with_capacity(batch.len());
            for entry in batch {
                let fetcher = Arc::clone(&self.fetcher);
                let gate = self.gate.clone();
                let task = FetchTask::from_entry(entry);
                joins.push((
                    entry.clone(),
                    tokio::spawn(async move { fetcher.fetch(&gate, &task).await }),
                ));
            }

            let mut batch_succeeded = 0usize;
            for (entry, join) in joins {
                match join.await {
                    Ok(FetchOutcome::Success { path, .. }) => {
                        batch_succeeded += 1;
                        report.succeeded.push(path);
                    }
                    Ok(FetchOutcome::Failure(failure)) => report.failures.push(failure),
                    Err(join_error) => {
                        // A panicked task still owes the run one outcome.
                        warn!(url = %entry.url, error = %join_error, "fetch task panicked");
                        report.failures.push(FailureRecord::fetch(
                            entry.label,
                            entry.url,
                            1,
                            None,
                            "panic",
                            join_error.to_string(),
                        ));
                    }
                }
            }

            completed += batch.len();
            let _ = self.progress.send(Progress { completed, total });
            info!(
                batch = batch_index + 1,
                batches = batch_count,
                batch_success_rate = %format!(
                    "{:.1}%",
                    batch_succeeded as f64 / batch.len() as f64 * 100.0
                ),
                completed,
                total,
                "batch complete"
            );
        }

        log_run_stats(started, &report);
        report
    }

    /// Resolves every entry as a (possibly multi-page) document, batch by
    /// batch, with one document as the unit of intra-batch concurrency.
    ///
    /// Returns the page set (documents with at least one fetched page, keyed
    /// by document id, colliding ids disambiguated with a numeric suffix)
    /// and the recorded failures.
    #[instrument(skip(self, entries, prober), fields(total = entries.len()))]
    pub async fn run_paged(
        &self,
        entries: &[SourceEntry],
        prober: &PageProber,
    ) -> (DocumentPageSet, Vec<FailureRecord>) {
        let total = entries.len();
        let mut page_set = DocumentPageSet::new();
        let mut failures = Vec::new();
        if total == 0 {
            return (page_set, failures);
        }

        let started = Instant::now();
        let batch_count = total.div_ceil(self.batch_size);
        let mut completed = 0usize;

        info!(total, batches = batch_count, "starting paged batch run");

        for (batch_index, batch) in entries.chunks(self.batch_size).enumerate() {
            let mut joins: Vec<(String, JoinHandle<(Vec<PathBuf>, Vec<FailureRecord>)>)> =
                Vec::with_capacity(batch.len());
            for entry in batch {
                let fetcher = Arc::clone(&self.fetcher);
                let gate = self.gate.clone();
                let prober = prober.clone();
                let entry_clone = entry.clone();
                joins.push((
                    entry.document_id(),
                    tokio::spawn(async move {
                        prober.resolve(&fetcher, &gate, &entry_clone).await
                    }),
                ));
            }

            for (document_id, join) in joins {
                match join.await {
                    Ok((pages, document_failures)) => {
                        failures.extend(document_failures);
                        if !pages.is_empty() {
                            insert_document(&mut page_set, document_id, pages);
                        }
                    }
                    Err(join_error) => {
                        warn!(document = %document_id, error = %join_error, "document task panicked");
                        failures.push(FailureRecord::fetch(
                            Some(document_id),
                            String::new(),
                            1,
                            None,
                            "panic",
                            join_error.to_string(),
                        ));
                    }
                }
            }

            completed += batch.len();
            let _ = self.progress.send(Progress { completed, total });
            info!(
                batch = batch_index + 1,
                batches = batch_count,
                completed,
                total,
                documents = page_set.len(),
                "paged batch complete"
            );
        }

        let elapsed = started.elapsed();
        info!(
            documents = page_set.len(),
            failures = failures.len(),
            elapsed_secs = %format!("{:.1}", elapsed.as_secs_f64()),
            "paged run complete"
        );
        (page_set, failures)
    }
}

/// Inserts a document's pages, disambiguating id collisions with a numeric
/// suffix rather than overwriting.
fn insert_document(page_set: &mut DocumentPageSet, document_id: String, pages: Vec<PathBuf>) {
    if !page_set.contains_key(&document_id) {
        page_set.insert(document_id, pages);
        return;
    }
    for suffix in 2..10_000usize {
        let candidate = format!("{document_id}_{suffix}");
        if !page_set.contains_key(&candidate) {
            debug!(document = %document_id, renamed = %candidate, "document id collision");
            page_set.insert(candidate, pages);
            return;
        }
    }
}

fn log_run_stats(started: Instant, report: &BatchReport) {
    let elapsed = started.elapsed();
    let total = report.total();
    let avg_secs = if total == 0 {
        0.0
    } else {
        elapsed.as_secs_f64() / total as f64
    };
    info!(
        succeeded = report.succeeded.len(),
        failed = report.failures.len(),
        success_rate = %format!("{:.1}%", report.success_rate()),
        elapsed_secs = %format!("{:.1}", elapsed.as_secs_f64()),
        avg_secs_per_item = %format!("{avg_secs:.3}"),
        "batch run complete"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_zero_batch_size() {
        let fetcher = Arc::new(Fetcher::new("/tmp"));
        let gate = ConcurrencyGate::new(2).unwrap();
        let result = BatchRunner::new(fetcher, gate, 0);
        assert!(matches!(
            result,
            Err(BatchError::InvalidBatchSize { value: 0 })
        ));
    }

    #[test]
    fn test_report_success_rate() {
        let mut report = BatchReport::default();
        assert!((report.success_rate() - 100.0).abs() < f64::EPSILON);

        report.succeeded.push(PathBuf::from("/tmp/a"));
        report.succeeded.push(PathBuf::from("/tmp/b"));
        report.failures.push(FailureRecord::fetch(
            None,
            "https://example.com",
            1,
            Some(500),
            "500",
            "HTTP 500",
        ));
        assert_eq!(report.total(), 3);
        assert!((report.success_rate() - 200.0 / 3.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_run_empty_input_returns_empty_report() {
        let fetcher = Arc::new(Fetcher::new("/tmp"));
        let gate = ConcurrencyGate::new(2).unwrap();
        let runner = BatchRunner::new(fetcher, gate, 10).unwrap();

        let report = runner.run(&[]).await;
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn test_insert_document_disambiguates_collisions() {
        let mut page_set = DocumentPageSet::new();
        insert_document(&mut page_set, "doc".to_string(), vec![PathBuf::from("a")]);
        insert_document(&mut page_set, "doc".to_string(), vec![PathBuf::from("b")]);
        insert_document(&mut page_set, "doc".to_string(), vec![PathBuf::from("c")]);

        assert_eq!(page_set.len(), 3);
        assert_eq!(page_set["doc"], vec![PathBuf::from("a")]);
        assert_eq!(page_set["doc_2"], vec![PathBuf::from("b")]);
        assert_eq!(page_set["doc_3"], vec![PathBuf::from("c")]);
    }
}
