//! Top-level drivers wiring fetch, conversion, and the failure ledger.
//!
//! Each driver corresponds to one CLI entry point: a single resource, an
//! ad-hoc URL set, a flat URL file, a tabular manifest (with multi-page
//! probing), or an already-downloaded directory. Per-item failures land in
//! the ledger and the run keeps going; only systemic problems (unreadable
//! input, no output root) abort with an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use crate::convert::{ConversionOutcome, PdfAssembler, SUPPORTED_EXTENSIONS, batch_output_path};
use crate::fetch::{
    BatchRunner, ConcurrencyGate, FetchOutcome, FetchTask, Fetcher, PageProber, Progress,
    SourceEntry,
};
use crate::input;
use crate::ledger::{ErrorLedger, FailureRecord};

/// Configuration shared by every pipeline driver.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root output directory; images land in `imgs/`, PDFs in `pdfs/`.
    pub output_dir: PathBuf,
    /// Maximum concurrent fetches (1-100).
    pub concurrency: usize,
    /// Per-request timeout.
    pub timeout: std::time::Duration,
    /// PDF encoding resolution.
    pub dpi: u32,
    /// Blocking conversion worker count.
    pub workers: usize,
    /// Items per batch for fetching and bulk conversion.
    pub batch_size: usize,
    /// Upper bound on probed pages per document.
    pub max_pages: std::num::NonZeroU32,
    /// Page-index query parameter name.
    pub page_param: String,
    /// Keep downloaded images after successful conversion.
    pub keep_images: bool,
    /// Show an interactive progress bar.
    pub progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            concurrency: crate::fetch::DEFAULT_CONCURRENCY,
            timeout: std::time::Duration::from_secs(crate::fetch::DEFAULT_TIMEOUT_SECS),
            dpi: crate::convert::DEFAULT_DPI,
            workers: crate::convert::DEFAULT_WORKERS,
            batch_size: crate::fetch::DEFAULT_BATCH_SIZE,
            max_pages: std::num::NonZeroU32::new(crate::fetch::DEFAULT_MAX_PAGES)
                .unwrap_or(std::num::NonZeroU32::MIN),
            page_param: crate::fetch::DEFAULT_PAGE_PARAM.to_string(),
            keep_images: false,
            progress: false,
        }
    }
}

impl PipelineConfig {
    fn images_dir(&self) -> PathBuf {
        self.output_dir.join("imgs")
    }

    fn pdfs_dir(&self) -> PathBuf {
        self.output_dir.join("pdfs")
    }

    fn urls_dir(&self) -> PathBuf {
        self.output_dir.join("urls")
    }
}

/// Aggregate result of one top-level run, for exit-code mapping.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Successfully fetched items.
    pub fetched: usize,
    /// Failed fetches (including broken page probes).
    pub fetch_failures: usize,
    /// Documents/images converted to PDF.
    pub converted: usize,
    /// Conversion failures.
    pub conversion_failures: usize,
    /// Path of the failure report, when one was written.
    pub report_path: Option<PathBuf>,
    /// Overall verdict for the surrounding CLI.
    pub succeeded: bool,
}

/// Fetches one URL and converts it into a single-page PDF.
///
/// # Errors
///
/// Returns an error only for systemic problems (output root not creatable).
pub async fn run_single(
    config: &PipelineConfig,
    url: &str,
    output_name: Option<&str>,
) -> Result<RunSummary> {
    prepare_dirs(config)?;
    let ledger = ErrorLedger::new();
    let gate = ConcurrencyGate::new(config.concurrency)?;
    let fetcher = Fetcher::with_timeout(config.images_dir(), config.timeout);

    info!(url, "fetching single resource");
    let outcome = fetcher.fetch(&gate, &FetchTask::new(url)).await;
    let mut summary = RunSummary::default();

    let image = match outcome {
        FetchOutcome::Success { path, .. } => {
            summary.fetched = 1;
            path
        }
        FetchOutcome::Failure(failure) => {
            ledger.record(failure);
            summary.fetch_failures = 1;
            return finish(config, &ledger, summary);
        }
    };

    let assembler = PdfAssembler::new(config.dpi, config.workers)?;
    let pdf_name = output_name.map_or_else(
        || {
            let stem = image
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("document");
            format!("{stem}.pdf")
        },
        std::string::ToString::to_string,
    );
    let pdf_path = config.pdfs_dir().join(pdf_name);

    if assembler.convert_one(&image, &pdf_path).await {
        summary.converted = 1;
        summary.succeeded = true;
        cleanup_images(config, std::slice::from_ref(&image));
    } else {
        ledger.record(FailureRecord::conversion(&image, "conversion failed"));
        summary.conversion_failures = 1;
    }
    assembler.shutdown().await;

    finish(config, &ledger, summary)
}

/// Fetches a set of URLs and converts the downloaded images.
///
/// With `combine` every image becomes a page of one timestamped PDF;
/// otherwise each image becomes its own PDF, mirroring the images
/// directory layout.
///
/// # Errors
///
/// Returns an error only for systemic problems.
pub async fn run_urls(
    config: &PipelineConfig,
    entries: Vec<SourceEntry>,
    combine: bool,
) -> Result<RunSummary> {
    prepare_dirs(config)?;
    let ledger = ErrorLedger::new();
    let mut summary = RunSummary::default();
    if entries.is_empty() {
        warn!("no URLs to process");
        return finish(config, &ledger, summary);
    }

    let started = Instant::now();
    let gate = ConcurrencyGate::new(config.concurrency)?;
    let fetcher = Arc::new(Fetcher::with_timeout(config.images_dir(), config.timeout));
    let runner = BatchRunner::new(fetcher, gate, config.batch_size)?;
    let bar = spawn_progress_bar(config, runner.progress());

    info!(urls = entries.len(), "starting download phase");
    let report = runner.run(&entries).await;
    if let Some(bar) = bar {
        let _ = bar.await;
    }

    summary.fetched = report.succeeded.len();
    summary.fetch_failures = report.failures.len();
    ledger.merge(report.failures);

    if report.succeeded.is_empty() {
        warn!("no resources fetched successfully");
        return finish(config, &ledger, summary);
    }
    info!(
        fetched = summary.fetched,
        elapsed_secs = %format!("{:.1}", started.elapsed().as_secs_f64()),
        "download phase complete"
    );

    // Ready-made PDFs and other non-raster payloads skip conversion but
    // still count as fetch successes.
    let images: Vec<PathBuf> = report
        .succeeded
        .iter()
        .filter(|path| is_supported_image(path))
        .cloned()
        .collect();
    if images.is_empty() {
        info!("no raster images to convert");
        summary.succeeded = true;
        return finish(config, &ledger, summary);
    }

    let assembler = PdfAssembler::new(config.dpi, config.workers)?;
    let converted_ok = if combine {
        let pdf_path = config.pdfs_dir().join(combined_pdf_name());
        let ok = assembler.convert_many(&images, &pdf_path).await;
        if ok {
            summary.converted = 1;
        } else {
            ledger.record(FailureRecord::conversion(&pdf_path, "combined conversion failed"));
            summary.conversion_failures = 1;
        }
        ok
    } else {
        let ok = assembler
            .convert_batch(&images, &config.images_dir(), &config.pdfs_dir(), config.batch_size)
            .await;
        record_batch_conversions(config, &ledger, &images, &mut summary);
        ok
    };
    assembler.shutdown().await;

    if converted_ok {
        summary.succeeded = true;
        cleanup_images(config, &images);
    }
    finish(config, &ledger, summary)
}

/// Processes a flat URL-list file.
///
/// # Errors
///
/// Returns an error when the file is unreadable or yields no URLs.
pub async fn run_url_file(config: &PipelineConfig, path: &Path, combine: bool) -> Result<RunSummary> {
    let parsed = input::read_url_file(path)
        .with_context(|| format!("reading URL file {}", path.display()))?;
    run_urls(config, parsed.entries, combine).await
}

/// Processes a tabular manifest, resolving each row as a (possibly
/// multi-page) document via page probing.
///
/// # Errors
///
/// Returns an error when the manifest is unreadable or yields no rows.
pub async fn run_manifest(
    config: &PipelineConfig,
    path: &Path,
    base_url: &Url,
    combine: bool,
) -> Result<RunSummary> {
    prepare_dirs(config)?;
    let parsed = input::read_manifest(path, base_url)
        .with_context(|| format!("reading manifest {}", path.display()))?;

    // Side outputs: the resolved URL list and the label-to-URL map.
    input::write_url_list(&parsed.entries, &config.urls_dir().join("preview_urls.txt"))?;
    input::write_url_map(&parsed.entries, &config.urls_dir().join("filename_url_map.csv"))?;

    let ledger = ErrorLedger::new();
    let mut summary = RunSummary::default();

    let gate = ConcurrencyGate::new(config.concurrency)?;
    let fetcher = Arc::new(Fetcher::with_timeout(config.images_dir(), config.timeout));
    let runner = BatchRunner::new(fetcher, gate, config.batch_size)?;
    let prober = PageProber::new(config.page_param.clone(), config.max_pages);
    let bar = spawn_progress_bar(config, runner.progress());

    info!(documents = parsed.entries.len(), "starting document resolution");
    let (page_set, failures) = runner.run_paged(&parsed.entries, &prober).await;
    if let Some(bar) = bar {
        let _ = bar.await;
    }

    summary.fetched = page_set.values().map(Vec::len).sum();
    summary.fetch_failures = failures.len();
    ledger.merge(failures);

    if page_set.is_empty() {
        warn!("no documents yielded any pages");
        return finish(config, &ledger, summary);
    }

    let assembler = PdfAssembler::new(config.dpi, config.workers)?;
    let mut outcomes: Vec<ConversionOutcome> = Vec::new();

    if combine {
        let all_pages: Vec<PathBuf> = page_set.values().flatten().cloned().collect();
        let pdf_path = config.pdfs_dir().join(combined_pdf_name());
        let ok = assembler.convert_many(&all_pages, &pdf_path).await;
        if !ok {
            ledger.record(FailureRecord::conversion(&pdf_path, "combined conversion failed"));
        }
        outcomes.push(ConversionOutcome::new("combined", pdf_path, ok));
    } else {
        for (document_id, pages) in &page_set {
            let pdf_path = config.pdfs_dir().join(format!("{document_id}.pdf"));
            let ok = assembler.convert_many(pages, &pdf_path).await;
            if !ok {
                ledger.record(FailureRecord::conversion(&pdf_path, "document conversion failed"));
            }
            outcomes.push(ConversionOutcome::new(document_id.clone(), pdf_path, ok));
        }
    }
    assembler.shutdown().await;

    summary.converted = outcomes.iter().filter(|o| o.succeeded).count();
    summary.conversion_failures = outcomes.len() - summary.converted;
    summary.succeeded = summary.converted > 0;

    // Intermediates are deleted per document, and only after its PDF landed.
    for outcome in &outcomes {
        if outcome.succeeded {
            if outcome.document_id == "combined" {
                let all_pages: Vec<PathBuf> = page_set.values().flatten().cloned().collect();
                cleanup_images(config, &all_pages);
            } else if let Some(pages) = page_set.get(&outcome.document_id) {
                cleanup_images(config, pages);
            }
        }
    }

    finish(config, &ledger, summary)
}

/// Converts every supported image under a local directory.
///
/// # Errors
///
/// Returns an error when the directory cannot be traversed.
pub async fn run_directory(
    config: &PipelineConfig,
    input_dir: &Path,
    recursive: bool,
    combine: bool,
) -> Result<RunSummary> {
    prepare_dirs(config)?;
    let ledger = ErrorLedger::new();
    let mut summary = RunSummary::default();

    let images = discover_images(input_dir, recursive)
        .with_context(|| format!("scanning {}", input_dir.display()))?;
    if images.is_empty() {
        warn!(dir = %input_dir.display(), "no supported images found");
        return finish(config, &ledger, summary);
    }
    info!(images = images.len(), "found images to convert");

    let assembler = PdfAssembler::new(config.dpi, config.workers)?;
    let ok = if combine {
        let dir_name = input_dir
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("directory");
        let pdf_path = config.pdfs_dir().join(format!("{dir_name}_combined.pdf"));
        let ok = assembler.convert_many(&images, &pdf_path).await;
        if ok {
            summary.converted = 1;
        } else {
            ledger.record(FailureRecord::conversion(&pdf_path, "combined conversion failed"));
            summary.conversion_failures = 1;
        }
        ok
    } else {
        let ok = assembler
            .convert_batch(&images, input_dir, &config.pdfs_dir(), config.batch_size)
            .await;
        // Ledger one record per image whose PDF did not materialize.
        for input in &images {
            let expected = batch_output_path(input, input_dir, &config.pdfs_dir());
            if expected.exists() {
                summary.converted += 1;
            } else {
                ledger.record(FailureRecord::conversion(input, "conversion failed"));
                summary.conversion_failures += 1;
            }
        }
        ok
    };
    assembler.shutdown().await;

    summary.succeeded = ok;
    finish(config, &ledger, summary)
}

/// Creates the output directory tree; failure here is systemic.
fn prepare_dirs(config: &PipelineConfig) -> Result<()> {
    for dir in [config.output_dir.clone(), config.images_dir(), config.pdfs_dir()] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }
    Ok(())
}

/// Flushes the ledger and stamps the final verdict into the summary.
fn finish(
    config: &PipelineConfig,
    ledger: &ErrorLedger,
    mut summary: RunSummary,
) -> Result<RunSummary> {
    match ledger.flush(&config.output_dir) {
        Ok(report_path) => summary.report_path = report_path,
        Err(error) => warn!(error = %error, "could not write failure report"),
    }
    info!(
        fetched = summary.fetched,
        fetch_failures = summary.fetch_failures,
        converted = summary.converted,
        conversion_failures = summary.conversion_failures,
        succeeded = summary.succeeded,
        "run finished"
    );
    Ok(summary)
}

fn record_batch_conversions(
    config: &PipelineConfig,
    ledger: &ErrorLedger,
    images: &[PathBuf],
    summary: &mut RunSummary,
) {
    for input in images {
        let expected = batch_output_path(input, &config.images_dir(), &config.pdfs_dir());
        if expected.exists() {
            summary.converted += 1;
        } else {
            ledger.record(FailureRecord::conversion(input, "conversion failed"));
            summary.conversion_failures += 1;
        }
    }
}

fn combined_pdf_name() -> String {
    format!("combined_{}.pdf", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Finds supported images under `dir`, optionally recursing, in sorted
/// order for deterministic page sequences.
fn discover_images(dir: &Path, recursive: bool) -> std::io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if is_supported_image(&path) {
                images.push(path);
            }
        }
    }
    images.sort();
    Ok(images)
}

/// Deletes intermediate images after successful conversion, unless the run
/// asked to keep them.
fn cleanup_images(config: &PipelineConfig, images: &[PathBuf]) {
    if config.keep_images {
        return;
    }
    for image in images {
        if let Err(error) = std::fs::remove_file(image) {
            debug!(path = %image.display(), error = %error, "could not remove intermediate");
        }
    }
    debug!(count = images.len(), "removed intermediate images");
}

/// Feeds an indicatif bar from the runner's progress channel.
///
/// Progress is observational: the bar task ends when the channel closes or
/// the run completes, and never affects control flow.
fn spawn_progress_bar(
    config: &PipelineConfig,
    mut progress: watch::Receiver<Progress>,
) -> Option<tokio::task::JoinHandle<()>> {
    if !config.progress {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut bar: Option<ProgressBar> = None;
        while progress.changed().await.is_ok() {
            let snapshot = *progress.borrow_and_update();
            if snapshot.total == 0 {
                continue;
            }
            let bar = bar.get_or_insert_with(|| {
                let bar = ProgressBar::new(snapshot.total as u64);
                bar.set_style(
                    ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar
            });
            bar.set_position(snapshot.completed as u64);
            if snapshot.completed >= snapshot.total {
                break;
            }
        }
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_supported_image() {
        assert!(is_supported_image(Path::new("a.png")));
        assert!(is_supported_image(Path::new("a.JPG")));
        assert!(!is_supported_image(Path::new("a.pdf")));
        assert!(!is_supported_image(Path::new("a")));
    }

    #[test]
    fn test_combined_pdf_name_shape() {
        let name = combined_pdf_name();
        assert!(name.starts_with("combined_"));
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn test_discover_images_non_recursive() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.png"), b"x").unwrap();
        std::fs::write(temp_dir.path().join("b.txt"), b"x").unwrap();
        let nested = temp_dir.path().join("sub");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("c.png"), b"x").unwrap();

        let images = discover_images(temp_dir.path(), false).unwrap();
        assert_eq!(images.len(), 1);
        assert!(images[0].ends_with("a.png"));
    }

    #[test]
    fn test_discover_images_recursive_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("sub");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(temp_dir.path().join("b.png"), b"x").unwrap();
        std::fs::write(nested.join("a.png"), b"x").unwrap();

        let images = discover_images(temp_dir.path(), true).unwrap();
        assert_eq!(images.len(), 2);
        let sorted: Vec<_> = {
            let mut copy = images.clone();
            copy.sort();
            copy
        };
        assert_eq!(images, sorted);
    }

    #[test]
    fn test_prepare_dirs_creates_tree() {
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            output_dir: temp_dir.path().join("out"),
            ..PipelineConfig::default()
        };
        prepare_dirs(&config).unwrap();
        assert!(config.images_dir().is_dir());
        assert!(config.pdfs_dir().is_dir());
    }

    #[test]
    fn test_cleanup_images_respects_keep_flag() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("a.png");
        std::fs::write(&image, b"x").unwrap();

        let keep = PipelineConfig {
            keep_images: true,
            ..PipelineConfig::default()
        };
        cleanup_images(&keep, std::slice::from_ref(&image));
        assert!(image.exists());

        let remove = PipelineConfig::default();
        cleanup_images(&remove, std::slice::from_ref(&image));
        assert!(!image.exists());
    }

    #[test]
    fn test_default_config_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.concurrency, 20);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.dpi, 200);
        assert_eq!(config.page_param, "previewFileIndex");
        assert!(!config.keep_images);
    }
}
