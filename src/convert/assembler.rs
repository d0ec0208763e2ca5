//! Batch image-to-PDF conversion with a bounded blocking worker pool.
//!
//! Decode and encode work is CPU/IO-bound, so it runs on blocking threads
//! gated by a worker semaphore; a busy encode queue cannot starve pending
//! downloads, and vice versa. Per-image failures are logged and skipped;
//! only a job with zero usable inputs counts as a failed conversion.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::pdf::write_pdf;
use super::ConvertError;

/// Raster extensions accepted for conversion.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "bmp", "webp"];

/// Default encoding resolution.
pub const DEFAULT_DPI: u32 = 200;

/// Default worker-pool size for blocking encode work.
pub const DEFAULT_WORKERS: usize = 8;

/// Converts raster images into single- or multi-page PDF documents.
///
/// One assembler owns one worker pool; it is not shared across assembler
/// instances. Call [`PdfAssembler::shutdown`] after the last conversion;
/// it drains pending work before returning.
#[derive(Debug)]
pub struct PdfAssembler {
    dpi: u32,
    workers: Arc<Semaphore>,
    worker_count: usize,
}

impl PdfAssembler {
    /// Creates an assembler encoding at `dpi` with `workers` blocking slots.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::InvalidWorkerCount`] when `workers` is
    /// outside 1-64.
    pub fn new(dpi: u32, workers: usize) -> Result<Self, ConvertError> {
        let worker_count = ConvertError::check_workers(workers)?;
        debug!(dpi, workers = worker_count, "creating PDF assembler");
        Ok(Self {
            dpi,
            workers: Arc::new(Semaphore::new(worker_count)),
            worker_count,
        })
    }

    /// Returns the configured encoding resolution.
    #[must_use]
    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Converts one image into a single-page PDF at `output`.
    ///
    /// Returns false on any failure; the cause is logged and the pipeline
    /// continues.
    #[instrument(skip(self), fields(input = %input.display(), output = %output.display()))]
    pub async fn convert_one(&self, input: &Path, output: &Path) -> bool {
        match self.convert_one_inner(input, output).await {
            Ok(()) => {
                info!("conversion complete");
                true
            }
            Err(error) => {
                warn!(error = %error, "conversion failed");
                false
            }
        }
    }

    /// Converts an ordered image sequence into one multi-page PDF.
    ///
    /// Images that fail validation or decoding are skipped with a logged
    /// failure; page order follows input order. Returns false when zero
    /// images were usable (an empty PDF is never produced).
    #[instrument(skip(self, inputs), fields(inputs = inputs.len(), output = %output.display()))]
    pub async fn convert_many(&self, inputs: &[PathBuf], output: &Path) -> bool {
        match self.convert_many_inner(inputs, output).await {
            Ok(pages) => {
                info!(pages, "combined conversion complete");
                true
            }
            Err(error) => {
                warn!(error = %error, "combined conversion failed");
                false
            }
        }
    }

    /// Converts many images into independent single-page PDFs, in
    /// fixed-size concurrent groups, mirroring the directory layout of
    /// `input_root` under `output_root`.
    ///
    /// Returns true iff at least one image converted successfully, so bulk
    /// jobs are not voided by a minority of bad inputs.
    #[instrument(skip(self, inputs), fields(inputs = inputs.len()))]
    pub async fn convert_batch(
        &self,
        inputs: &[PathBuf],
        input_root: &Path,
        output_root: &Path,
        batch_size: usize,
    ) -> bool {
        if inputs.is_empty() {
            warn!("no images supplied for batch conversion");
            return false;
        }
        let batch_size = batch_size.max(1);
        let total = inputs.len();
        let batch_count = total.div_ceil(batch_size);
        let started = Instant::now();
        let mut succeeded = 0usize;

        info!(total, batches = batch_count, "starting batch conversion");

        for (batch_index, batch) in inputs.chunks(batch_size).enumerate() {
            let mut handles = Vec::with_capacity(batch.len());
            for input in batch {
                let input = input.clone();
                let output = batch_output_path(&input, input_root, output_root);
                handles.push(async move { self.convert_one(&input, &output).await });
            }

            let results = futures_util::future::join_all(handles).await;
            let batch_succeeded = results.iter().filter(|ok| **ok).count();
            succeeded += batch_succeeded;

            info!(
                batch = batch_index + 1,
                batches = batch_count,
                batch_success_rate = %format!(
                    "{:.1}%",
                    batch_succeeded as f64 / batch.len() as f64 * 100.0
                ),
                "conversion batch complete"
            );
        }

        let elapsed = started.elapsed();
        info!(
            succeeded,
            failed = total - succeeded,
            success_rate = %format!("{:.1}%", succeeded as f64 / total as f64 * 100.0),
            elapsed_secs = %format!("{:.1}", elapsed.as_secs_f64()),
            avg_secs_per_image = %format!("{:.3}", elapsed.as_secs_f64() / total as f64),
            "batch conversion complete"
        );
        succeeded > 0
    }

    /// Drains the worker pool: returns once no conversion work is pending.
    pub async fn shutdown(self) {
        let wanted = u32::try_from(self.worker_count).unwrap_or(u32::MAX);
        // Holding every slot proves all blocking work has finished.
        let _ = self.workers.acquire_many(wanted).await;
        debug!("assembler shut down");
    }

    async fn convert_one_inner(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        validate_input(input).await?;
        ensure_parent_dir(output).await?;

        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| ConvertError::PoolClosed)?;

        let input = input.to_path_buf();
        let output_path = output.to_path_buf();
        let dpi = self.dpi;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let rgb = load_rgb(&input)?;
            write_pdf(&[rgb], dpi, &output_path)
        })
        .await
        .map_err(|source| ConvertError::Worker { source })?
    }

    async fn convert_many_inner(
        &self,
        inputs: &[PathBuf],
        output: &Path,
    ) -> Result<usize, ConvertError> {
        if inputs.is_empty() {
            return Err(ConvertError::NoUsableImages {
                output: output.to_path_buf(),
            });
        }
        ensure_parent_dir(output).await?;

        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| ConvertError::PoolClosed)?;

        let inputs = inputs.to_vec();
        let output_path = output.to_path_buf();
        let dpi = self.dpi;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;

            let mut pages: Vec<RgbImage> = Vec::with_capacity(inputs.len());
            for input in &inputs {
                match validate_input_sync(input).and_then(|()| load_rgb(input)) {
                    Ok(rgb) => pages.push(rgb),
                    Err(error) => warn!(
                        input = %input.display(),
                        error = %error,
                        "skipping unusable image"
                    ),
                }
            }

            if pages.is_empty() {
                return Err(ConvertError::NoUsableImages {
                    output: output_path,
                });
            }
            let count = pages.len();
            write_pdf(&pages, dpi, &output_path)?;
            Ok(count)
        })
        .await
        .map_err(|source| ConvertError::Worker { source })?
    }
}

/// Maps an input image path to its mirrored `.pdf` path under `output_root`,
/// as used by [`PdfAssembler::convert_batch`].
#[must_use]
pub fn batch_output_path(input: &Path, input_root: &Path, output_root: &Path) -> PathBuf {
    let relative = input
        .strip_prefix(input_root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(input.file_name().unwrap_or_default()));
    output_root.join(relative.with_extension("pdf"))
}

/// Checks that a path exists and carries a supported raster extension.
async fn validate_input(path: &Path) -> Result<(), ConvertError> {
    if tokio::fs::metadata(path).await.is_err() {
        return Err(ConvertError::validation(path, "file does not exist"));
    }
    check_extension(path)
}

fn validate_input_sync(path: &Path) -> Result<(), ConvertError> {
    if !path.exists() {
        return Err(ConvertError::validation(path, "file does not exist"));
    }
    check_extension(path)
}

fn check_extension(path: &Path) -> Result<(), ConvertError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(ConvertError::validation(
            path,
            format!(
                "unsupported format: .{extension} (supported: {})",
                SUPPORTED_EXTENSIONS.join(", ")
            ),
        ))
    }
}

fn load_rgb(path: &Path) -> Result<RgbImage, ConvertError> {
    let decoded = image::open(path).map_err(|e| ConvertError::image(path, e))?;
    // Normalize to a 3-channel colorspace before encoding.
    Ok(decoded.to_rgb8())
}

async fn ensure_parent_dir(output: &Path) -> Result<(), ConvertError> {
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ConvertError::io(parent.to_path_buf(), e))?;
    }
    Ok(())
}
