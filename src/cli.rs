//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};

use pagepress_core::fetch::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_PARAM};

/// Bulk image retrieval and PDF assembly for remote document archives.
///
/// pagepress downloads document/image resources in batches, reconstructs
/// paginated documents by probing a page-index query parameter, and presses
/// the results into single- or multi-page PDFs.
#[derive(Parser, Debug)]
#[command(name = "pagepress")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Base directory for output (images under imgs/, PDFs under pdfs/)
    #[arg(short = 'o', long, global = true, default_value = "output")]
    pub output_dir: std::path::PathBuf,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, global = true, default_value_t = 20, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Per-request timeout in seconds (1-600)
    #[arg(short = 't', long, global = true, default_value_t = 30, value_parser = clap::value_parser!(u16).range(1..=600))]
    pub timeout: u16,

    /// Resolution for PDF encoding in DPI (50-1200)
    #[arg(long, global = true, default_value_t = 200, value_parser = clap::value_parser!(u16).range(50..=1200))]
    pub dpi: u16,

    /// Worker threads for conversion work (1-64)
    #[arg(short = 'w', long, global = true, default_value_t = 8, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub workers: u8,

    /// Items per processing batch (1-10000)
    #[arg(short = 'b', long, global = true, default_value_t = 100, value_parser = clap::value_parser!(u16).range(1..=10000))]
    pub batch_size: u16,

    /// Maximum pages probed per document (1-500)
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_PAGES, value_parser = clap::value_parser!(u32).range(1..=500))]
    pub max_pages: u32,

    /// Query parameter selecting the page index
    #[arg(long, global = true, default_value = DEFAULT_PAGE_PARAM)]
    pub page_param: String,

    /// Keep downloaded images after successful conversion
    #[arg(short = 'k', long, global = true)]
    pub keep_images: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline entry points.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download one resource and convert it to a PDF
    Single {
        /// URL of the resource
        url: String,

        /// Name of the output PDF file
        #[arg(long)]
        output: Option<String>,
    },

    /// Download several resources and convert them
    Multi {
        /// URLs of the resources
        #[arg(required = true)]
        urls: Vec<String>,

        /// Combine all images into one PDF
        #[arg(long)]
        combine: bool,
    },

    /// Process a flat text file with one URL per line
    File {
        /// Path to the URL list
        path: std::path::PathBuf,

        /// Combine all images into one PDF
        #[arg(long)]
        combine: bool,
    },

    /// Process a tabular manifest with FILENAME and PREVIEW_URL columns
    Manifest {
        /// Path to the manifest file
        path: std::path::PathBuf,

        /// Base URL for resolving relative preview URLs
        #[arg(long)]
        base_url: String,

        /// Combine all documents into one PDF
        #[arg(long)]
        combine: bool,
    },

    /// Convert images already present in a local directory
    Dir {
        /// Directory containing the images
        input_dir: std::path::PathBuf,

        /// Recurse into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Combine all images into one PDF
        #[arg(long)]
        combine: bool,
    },

    /// Check whether a URL serves a supported image or PDF
    Check {
        /// URL to probe
        url: String,
    },
}
