//! Concurrent, rate-limited acquisition of remote resources.
//!
//! The fetch pipeline has three layers:
//!
//! - [`Fetcher`] performs one streaming HTTP GET per [`FetchTask`], gated by
//!   the shared [`ConcurrencyGate`], and never lets a per-item error escape.
//! - [`PageProber`] reconstructs multi-page documents by walking a
//!   page-index query parameter until the server signals end-of-document.
//! - [`BatchRunner`] drives arbitrarily large inputs through sequential
//!   batches of concurrent fetches, conserving one outcome per entry.
//!
//! # Example
//!
//! ```no_run
//! use pagepress_core::fetch::{ConcurrencyGate, Fetcher, FetchTask};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gate = ConcurrencyGate::new(20)?;
//! let fetcher = Fetcher::new("./output/imgs");
//! let task = FetchTask::new("https://example.com/scan.png");
//! let outcome = fetcher.fetch(&gate, &task).await;
//! if let Some(path) = outcome.path() {
//!     println!("saved to {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

mod batch;
mod client;
mod error;
pub mod filename;
mod gate;
mod pages;
mod task;

pub use batch::{
    BatchError, BatchReport, BatchRunner, DEFAULT_BATCH_SIZE, DocumentPageSet, Progress,
};
pub use client::{DEFAULT_TIMEOUT_SECS, Fetcher};
pub use error::FetchError;
pub use gate::{ConcurrencyGate, DEFAULT_CONCURRENCY, GateError, SlotGuard};
pub use pages::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_PARAM, PageProber};
pub use task::{FetchOutcome, FetchTask, SourceEntry};
