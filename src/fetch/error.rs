//! Error types for the fetch module.
//!
//! Fetch failures are always captured at the item boundary and turned into
//! ledger records; these types carry the context needed to do that without
//! losing the underlying cause.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching one resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before the body finished streaming.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    ///
    /// A 404 during page probing is the expected end-of-document signal and
    /// is reclassified by the prober, not here.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while persisting the response body.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The shared concurrency gate was closed while waiting for a slot.
    #[error("concurrency gate closed")]
    GateClosed,
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns the HTTP status code when this error carries one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short detail token for failure records ("404", "timeout", ...).
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Network { .. } => "network".to_string(),
            Self::Timeout { .. } => "timeout".to_string(),
            Self::HttpStatus { status, .. } => status.to_string(),
            Self::Io { .. } => "io".to_string(),
            Self::InvalidUrl { .. } => "invalid-url".to_string(),
            Self::GateClosed => "gate-closed".to_string(),
        }
    }
}

// No blanket `From<reqwest::Error>` / `From<std::io::Error>` impls: the
// variants require context (url, path) the source errors don't carry, so the
// constructor helpers are the conversion points.
