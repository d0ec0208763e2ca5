//! Error types for image-to-PDF conversion.

use std::path::PathBuf;

use thiserror::Error;

/// Minimum allowed worker count.
const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
const MAX_WORKERS: usize = 64;

/// Errors that can occur while converting images to PDF.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The input failed precondition checks (missing file, unsupported
    /// extension).
    #[error("invalid input {path}: {reason}")]
    Validation {
        /// The rejected input path.
        path: PathBuf,
        /// Why the input was rejected.
        reason: String,
    },

    /// The image could not be decoded or re-encoded.
    #[error("image error for {path}: {source}")]
    Image {
        /// The image path involved.
        path: PathBuf,
        /// The underlying codec error.
        #[source]
        source: image::ImageError,
    },

    /// The PDF document could not be assembled or written.
    #[error("PDF error writing {path}: {source}")]
    Pdf {
        /// The output PDF path.
        path: PathBuf,
        /// The underlying lopdf error.
        #[source]
        source: lopdf::Error,
    },

    /// File system error around conversion (directory creation etc.).
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Paths were supplied but none survived validation and decoding.
    #[error("no usable images for {output}")]
    NoUsableImages {
        /// The PDF that could not be produced.
        output: PathBuf,
    },

    /// The blocking worker task was cancelled or panicked.
    #[error("conversion worker failed: {source}")]
    Worker {
        /// The join error from the worker task.
        #[source]
        source: tokio::task::JoinError,
    },

    /// The worker pool was shut down while work was still being submitted.
    #[error("conversion worker pool is closed")]
    PoolClosed,

    /// Invalid worker-pool size.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkerCount {
        /// The invalid value that was provided.
        value: usize,
    },
}

impl ConvertError {
    /// Creates a validation error.
    pub fn validation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an image codec error.
    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }

    /// Creates a PDF assembly error.
    pub fn pdf(path: impl Into<PathBuf>, source: lopdf::Error) -> Self {
        Self::Pdf {
            path: path.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Validates a worker-pool size.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::InvalidWorkerCount`] outside 1-64.
    pub fn check_workers(value: usize) -> Result<usize, Self> {
        if (MIN_WORKERS..=MAX_WORKERS).contains(&value) {
            Ok(value)
        } else {
            Err(Self::InvalidWorkerCount { value })
        }
    }
}
