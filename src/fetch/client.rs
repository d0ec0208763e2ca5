//! Streaming HTTP fetcher with per-item failure isolation.
//!
//! One [`Fetcher::fetch`] call is the unit of parallelism: it acquires a slot
//! from the shared [`ConcurrencyGate`], issues the GET, streams the body to
//! disk in chunks, and returns a [`FetchOutcome`]. All failure modes
//! (network errors, non-2xx statuses, timeouts, disk errors) are captured
//! and returned as failures; the call itself never errors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::filename;
use super::{ConcurrencyGate, FetchError, FetchOutcome, FetchTask};

/// Default HTTP connect timeout (10 seconds).
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-request timeout (30 seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP fetcher writing response bodies under a fixed output directory.
///
/// Designed to be created once per run and shared (cheap to clone, reuses
/// the connection pool).
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    output_dir: PathBuf,
    default_timeout: Duration,
}

impl Fetcher {
    /// Creates a fetcher saving into `output_dir` with the default timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self::with_timeout(output_dir, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a fetcher with an explicit default per-request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeout(output_dir: impl Into<PathBuf>, default_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            output_dir: output_dir.into(),
            default_timeout,
        }
    }

    /// Returns the directory fetched files are written under.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Fetches one resource, holding a gate slot for the full duration.
    ///
    /// The slot is released on every exit path (RAII guard); per-item errors
    /// are converted into [`FetchOutcome::Failure`] and never propagate.
    #[instrument(skip(self, gate, task), fields(url = %task.url, page = task.page_index))]
    pub async fn fetch(&self, gate: &ConcurrencyGate, task: &FetchTask) -> FetchOutcome {
        let _slot = match gate.acquire().await {
            Ok(guard) => guard,
            Err(error) => return FetchOutcome::Failure(task.failure(&error)),
        };

        match self.try_fetch(task).await {
            Ok((path, content_type)) => FetchOutcome::Success { path, content_type },
            Err(error) => {
                warn!(url = %task.url, error = %error, "fetch failed");
                FetchOutcome::Failure(task.failure(&error))
            }
        }
    }

    /// Probes a URL with a HEAD request and reports whether the response
    /// content type looks like a supported image or PDF.
    ///
    /// Advisory only; the second element is the content type on success or
    /// the error text on failure.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn check(&self, url: &str) -> (bool, String) {
        let request = self.client.head(url).timeout(self.default_timeout);
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                let content_type = header_value(&response, CONTENT_TYPE);
                (filename::is_known_content_type(&content_type), content_type)
            }
            Ok(response) => (false, format!("HTTP {}", response.status().as_u16())),
            Err(error) => (false, error.to_string()),
        }
    }

    async fn try_fetch(&self, task: &FetchTask) -> Result<(PathBuf, String), FetchError> {
        let parsed =
            Url::parse(&task.url).map_err(|_| FetchError::invalid_url(task.url.clone()))?;
        let timeout = task.timeout.unwrap_or(self.default_timeout);

        debug!(timeout_secs = timeout.as_secs(), "starting fetch");

        let response = self
            .client
            .get(parsed.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::timeout(task.url.clone())
                } else {
                    FetchError::network(task.url.clone(), e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(task.url.clone(), status.as_u16()));
        }

        let content_type = header_value(&response, CONTENT_TYPE);
        if !filename::is_known_content_type(&content_type) {
            // Advisory only: the payload is persisted regardless.
            warn!(
                url = %task.url,
                content_type = %content_type,
                "response content type is not a known image or PDF type"
            );
        }

        let name = resolve_name(task, &response, &parsed, &content_type);
        let name = filename::apply_page_suffix(&name, task.page_index);

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| FetchError::io(self.output_dir.clone(), e))?;
        let path = filename::resolve_unique_path(&self.output_dir, &name);
        debug!(path = %path.display(), "resolved output path");

        let bytes = self.stream_body(response, task, &path).await?;

        info!(
            url = %task.url,
            path = %path.display(),
            bytes,
            "fetch complete"
        );
        Ok((path, content_type))
    }

    /// Streams the response body to `path` in chunks; removes the partial
    /// file when the stream or a write fails.
    async fn stream_body(
        &self,
        response: reqwest::Response,
        task: &FetchTask,
        path: &Path,
    ) -> Result<u64, FetchError> {
        let file = File::create(path)
            .await
            .map_err(|e| FetchError::io(path.to_path_buf(), e))?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut bytes_written: u64 = 0;

        let result: Result<u64, FetchError> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| {
                    if e.is_timeout() {
                        FetchError::timeout(task.url.clone())
                    } else {
                        FetchError::network(task.url.clone(), e)
                    }
                })?;
                writer
                    .write_all(&chunk)
                    .await
                    .map_err(|e| FetchError::io(path.to_path_buf(), e))?;
                bytes_written += chunk.len() as u64;
            }
            writer
                .flush()
                .await
                .map_err(|e| FetchError::io(path.to_path_buf(), e))?;
            Ok(bytes_written)
        }
        .await;

        if result.is_err() {
            debug!(path = %path.display(), "cleaning up partial file after error");
            let _ = tokio::fs::remove_file(path).await;
        }

        result
    }
}

/// Output name priority: task hint, Content-Disposition, URL basename,
/// synthetic URL-hash name. A hint without an extension gets one from
/// the response content type so downstream extension checks still work.
fn resolve_name(
    task: &FetchTask,
    response: &reqwest::Response,
    parsed: &Url,
    content_type: &str,
) -> String {
    if let Some(hint) = task.filename_hint.as_deref() {
        let hint = filename::sanitize_filename(hint);
        if !hint.trim_matches('_').is_empty() {
            if filename::has_extension(&hint) {
                return hint;
            }
            return format!(
                "{hint}{}",
                filename::extension_for_content_type(content_type)
            );
        }
    }

    if let Some(header) = response.headers().get(CONTENT_DISPOSITION)
        && let Ok(value) = header.to_str()
        && let Some(name) = filename::parse_content_disposition(value)
    {
        let name = filename::sanitize_filename(&name);
        if !name.trim_matches('_').is_empty() {
            return name;
        }
    }

    if let Some(name) = filename::filename_from_url(parsed)
        && filename::has_extension(&name)
    {
        return name;
    }

    filename::synthetic_filename(&task.url, content_type)
}

fn header_value(response: &reqwest::Response, name: reqwest::header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
