//! Shared concurrency limit for in-flight fetches.
//!
//! The gate is an explicitly constructed handle passed to every fetch call;
//! there is no ambient or static limiter state. A slot is held as an RAII
//! guard, so it is released on every exit path including task cancellation.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrent fetch limit if not specified.
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Error constructing a concurrency gate.
#[derive(Debug, Error)]
pub enum GateError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Bounded-concurrency handle shared by all fetch tasks in a run.
///
/// Cloning is cheap; all clones share the same permit pool.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    permits: Arc<Semaphore>,
    limit: usize,
}

/// RAII guard for one fetch slot; dropping it releases the slot.
#[derive(Debug)]
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Creates a gate allowing at most `limit` concurrent fetches.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidConcurrency`] if `limit` is outside 1-100.
    pub fn new(limit: usize) -> Result<Self, GateError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&limit) {
            return Err(GateError::InvalidConcurrency { value: limit });
        }
        debug!(limit, "creating concurrency gate");
        Ok(Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        })
    }

    /// Waits for a free slot and returns its guard.
    ///
    /// # Errors
    ///
    /// Returns [`crate::fetch::FetchError::GateClosed`] if the underlying
    /// semaphore was closed (never done by this crate; kept for contract
    /// completeness).
    pub async fn acquire(&self) -> Result<SlotGuard, super::FetchError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| super::FetchError::GateClosed)?;
        Ok(SlotGuard { _permit: permit })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the number of currently free slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
            limit: DEFAULT_CONCURRENCY,
        }
    }
}
