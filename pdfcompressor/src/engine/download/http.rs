//! Streaming HTTP transfer of engine artifacts.
//!
//! Each attempt streams the response body straight into the staging file,
//! checking for cancellation between chunks. Transient failures (connection
//! errors, timeouts, 5xx/408/429, truncated bodies) are retried with
//! exponential backoff; anything else fails immediately.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::progress::{ProgressTracker, DEFAULT_PROGRESS_INTERVAL};
use crate::engine::error::{EngineError, EngineResult, InstallError};

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default base delay between attempts; doubles each retry.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Default overall request timeout (the artifact is tens of megabytes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Backoff never exceeds this.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Transfer settings.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Base backoff delay.
    pub retry_backoff: Duration,
    pub connect_timeout: Duration,
    /// Whole-request timeout per attempt.
    pub timeout: Duration,
    /// Minimum interval between progress events.
    pub progress_interval: Duration,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: DEFAULT_TIMEOUT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl DownloadSettings {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        self.retry_backoff
            .saturating_mul(1u32 << shift)
            .min(MAX_BACKOFF)
    }
}

/// Why a single attempt failed.
#[derive(Debug)]
enum AttemptError {
    Retryable(String),
    Fatal(String),
    Cancelled,
    Staging(InstallError),
}

/// Async HTTP downloader for a single artifact.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    settings: DownloadSettings,
}

impl HttpFetcher {
    pub fn new(settings: DownloadSettings) -> Self {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.timeout)
            .user_agent(concat!("pdfcompressor/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });
        Self { client, settings }
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    /// Download `url` into `dest`, retrying transient failures.
    ///
    /// `on_progress` receives coalesced, non-decreasing percentages below 100.
    /// Returns the number of bytes written.
    pub async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
        on_progress: &mut (dyn FnMut(u8) + Send),
    ) -> EngineResult<u64> {
        let attempts = self.settings.retries + 1;
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.settings.backoff_for(attempt - 1);
                debug!(url, attempt, ?delay, "Backing off before retry");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match self.attempt(url, dest, tracker, cancel, on_progress).await {
                Ok(bytes) => {
                    debug!(url, attempt, bytes, "Download attempt succeeded");
                    return Ok(bytes);
                }
                Err(AttemptError::Retryable(reason)) => {
                    warn!(url, attempt, max_attempts = attempts, reason = %reason, "Download attempt failed");
                    last_reason = reason;
                }
                Err(AttemptError::Fatal(reason)) => {
                    return Err(EngineError::Network {
                        url: url.to_string(),
                        attempts: attempt,
                        reason,
                    });
                }
                Err(AttemptError::Cancelled) => return Err(EngineError::Cancelled),
                Err(AttemptError::Staging(e)) => return Err(e.into()),
            }
        }

        Err(EngineError::Network {
            url: url.to_string(),
            attempts,
            reason: last_reason,
        })
    }

    async fn attempt(
        &self,
        url: &str,
        dest: &Path,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
        on_progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<u64, AttemptError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
            result = self.client.get(url).send() => result.map_err(classify_reqwest_error)?,
        };

        let status = response.status();
        if !status.is_success() {
            let reason = format!("GET request failed with status {}", status);
            return Err(if should_retry_status(status) {
                AttemptError::Retryable(reason)
            } else {
                AttemptError::Fatal(reason)
            });
        }

        let total = response.content_length();
        tracker.start_attempt(total);

        let staging = |e: std::io::Error| AttemptError::Staging(InstallError::io(dest, e));
        let mut file = tokio::fs::File::create(dest).await.map_err(staging)?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let chunk = match next {
                None => break,
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return Err(AttemptError::Retryable(format!("read error: {}", e))),
            };

            file.write_all(&chunk).await.map_err(staging)?;
            written += chunk.len() as u64;
            if let Some(pct) = tracker.advance(chunk.len() as u64) {
                on_progress(pct);
            }
        }

        file.flush().await.map_err(staging)?;
        file.sync_all().await.map_err(staging)?;

        if let Some(total) = total {
            if written != total {
                return Err(AttemptError::Retryable(format!(
                    "body truncated: received {} of {} bytes",
                    written, total
                )));
            }
        }

        Ok(written)
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn classify_reqwest_error(err: reqwest::Error) -> AttemptError {
    if err.is_builder() {
        AttemptError::Fatal(err.to_string())
    } else {
        AttemptError::Retryable(err.to_string())
    }
}
