//! Deterministic batch conversion of raster images into PDF documents.
//!
//! Decoding and colorspace normalization are delegated to the `image`
//! crate, document layout to `lopdf`; this module orchestrates the calls
//! and keeps per-image failures from aborting bulk jobs.

mod assembler;
mod error;
mod pdf;

use std::path::PathBuf;

pub use assembler::{
    DEFAULT_DPI, DEFAULT_WORKERS, PdfAssembler, SUPPORTED_EXTENSIONS, batch_output_path,
};
pub use error::ConvertError;

/// Result of converting one logical document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    /// The document identifier the PDF was produced for.
    pub document_id: String,
    /// Path of the written (or attempted) PDF.
    pub pdf_path: PathBuf,
    /// Whether the conversion produced a PDF.
    pub succeeded: bool,
}

impl ConversionOutcome {
    /// Creates an outcome record.
    #[must_use]
    pub fn new(document_id: impl Into<String>, pdf_path: impl Into<PathBuf>, succeeded: bool) -> Self {
        Self {
            document_id: document_id.into(),
            pdf_path: pdf_path.into(),
            succeeded,
        }
    }
}
