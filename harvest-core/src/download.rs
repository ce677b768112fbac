//! Bounded downloader.
//!
//! Fetches candidate URLs under a global in-flight cap. Each attempt takes
//! a semaphore permit for the duration of the request and body transfer only;
//! backoff sleeps happen without a permit so waiting retries never starve
//! fresh downloads.
//!
//! ## Failure classes
//!
//! | Condition                                   | Outcome                         |
//! |---------------------------------------------|---------------------------------|
//! | connect/timeout/body error, 5xx             | retried, then `Transient`       |
//! | 429                                         | one retry after `Retry-After`   |
//! | any other 4xx, 408 included                 | `Permanent`                     |
//! | `Content-Type` not `image/*`                | `NonImageContent`               |
//! | body larger than `max_asset_bytes`          | `TooLarge`                      |

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{DownloadError, HarvestError, Result};
use crate::model::{Asset, Candidate};
use crate::provider::http_client::{
    is_transient_error, retry_after_from_headers, DEFAULT_RATE_LIMIT_WAIT,
};

/// Downloader settings.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Per-request timeout, body included.
    pub timeout: Duration,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_asset_bytes: u64,
    /// Upper bound on a server-requested `Retry-After` wait.
    pub max_rate_limit_wait: Duration,
    pub user_agent: String,
    /// Where bodies are streamed before acceptance.
    pub staging_dir: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(8),
            max_asset_bytes: 25 * 1024 * 1024,
            max_rate_limit_wait: Duration::from_secs(60),
            user_agent: concat!("harvest/", env!("CARGO_PKG_VERSION")).to_string(),
            staging_dir: std::env::temp_dir().join("harvest-staging"),
        }
    }
}

/// Current and peak number of in-flight download attempts.
#[derive(Debug, Clone, Default)]
pub struct DownloadGauge {
    inner: Arc<GaugeInner>,
}

#[derive(Debug, Default)]
struct GaugeInner {
    current: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the gauge on drop.
pub struct GaugeGuard {
    inner: Arc<GaugeInner>,
}

impl DownloadGauge {
    pub fn enter(&self) -> GaugeGuard {
        let now = self.inner.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn current(&self) -> usize {
        self.inner.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.inner.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Outcome of one attempt, before retry policy is applied.
#[derive(Debug)]
enum AttemptError {
    Transient(String),
    RateLimited(Duration),
    Permanent(DownloadError),
    Cancelled,
}

pub struct Downloader {
    client: Client,
    config: DownloadConfig,
    limiter: Arc<Semaphore>,
    gauge: DownloadGauge,
}

impl Downloader {
    /// Create a downloader allowing `max_concurrent` attempts in flight.
    pub fn new(config: DownloadConfig, max_concurrent: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| HarvestError::ConfigError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            gauge: DownloadGauge::default(),
        })
    }

    pub fn gauge(&self) -> &DownloadGauge {
        &self.gauge
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Download `candidate` into the staging directory.
    ///
    /// Once `cancel` fires no new attempt starts and any backoff or
    /// `Retry-After` wait ends at once; an attempt already holding a permit
    /// runs to completion. `DownloadError::Cancelled { attempts: 0 }` means
    /// nothing was fetched.
    #[instrument(level = "debug", skip_all, fields(url = %candidate.url(), provider = %candidate.provider_id()))]
    pub async fn download(
        &self,
        candidate: &Candidate,
        cancel: &CancellationToken,
    ) -> std::result::Result<Asset, DownloadError> {
        let start = Instant::now();
        let result = self.retry_loop(candidate, cancel).await;

        let latency_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(asset) => debug!(latency_ms, bytes = asset.byte_size, "Download completed"),
            Err(DownloadError::Cancelled { attempts }) => {
                debug!(latency_ms, attempts, "Download cancelled")
            }
            Err(e) => warn!(latency_ms, error = %e, "Download failed"),
        }
        result
    }

    async fn retry_loop(
        &self,
        candidate: &Candidate,
        cancel: &CancellationToken,
    ) -> std::result::Result<Asset, DownloadError> {
        let mut backoff = self.build_backoff();
        let mut attempts: u32 = 0;
        let mut rate_limited = false;

        loop {
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled { attempts });
            }
            attempts += 1;

            let (err, wait) = match self.attempt(candidate, cancel).await {
                Ok(asset) => return Ok(asset),
                Err(AttemptError::Transient(message)) => {
                    let err = DownloadError::Transient { attempts, message };
                    if attempts > self.config.max_retries {
                        return Err(err);
                    }
                    match backoff.next_backoff() {
                        Some(wait) => (err, wait),
                        None => return Err(err),
                    }
                }
                Err(AttemptError::RateLimited(wait)) => {
                    if rate_limited {
                        return Err(DownloadError::RateLimited);
                    }
                    rate_limited = true;
                    (
                        DownloadError::RateLimited,
                        wait.min(self.config.max_rate_limit_wait),
                    )
                }
                Err(AttemptError::Permanent(err)) => return Err(err),
                Err(AttemptError::Cancelled) => {
                    return Err(DownloadError::Cancelled {
                        attempts: attempts - 1,
                    })
                }
            };

            warn!(
                url = %candidate.url(),
                error = %err,
                retry_after_ms = wait.as_millis() as u64,
                "Download retry scheduled"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled { attempts }),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn attempt(
        &self,
        candidate: &Candidate,
        cancel: &CancellationToken,
    ) -> std::result::Result<Asset, AttemptError> {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
            permit = self.limiter.acquire() => permit.map_err(|_| {
                AttemptError::Permanent(DownloadError::Permanent {
                    message: "download limiter closed".into(),
                })
            })?,
        };
        let _in_flight = self.gauge.enter();

        let response = self.client.get(candidate.url()).send().await.map_err(|e| {
            if is_transient_error(&e) {
                AttemptError::Transient(e.to_string())
            } else {
                AttemptError::Permanent(DownloadError::Permanent {
                    message: e.to_string(),
                })
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let wait = retry_after_from_headers(response.headers(), chrono::Utc::now().timestamp())
                .unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
            return Err(AttemptError::RateLimited(wait));
        }
        if !status.is_success() {
            let message = format!("HTTP status {status}");
            return Err(if is_retryable_status(status) {
                AttemptError::Transient(message)
            } else {
                AttemptError::Permanent(DownloadError::Permanent { message })
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .trim()
            .to_string();
        if !content_type.to_ascii_lowercase().starts_with("image/") {
            return Err(AttemptError::Permanent(DownloadError::NonImageContent {
                content_type,
            }));
        }

        let limit = self.config.max_asset_bytes;
        let declared_len = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared_len.is_some_and(|len| len > limit) {
            return Err(AttemptError::Permanent(DownloadError::TooLarge { limit }));
        }

        let staging = self.staging_path();
        match self.stream_to(response, &staging).await {
            Ok(byte_size) => Ok(Asset {
                candidate: candidate.clone(),
                content_type,
                byte_size,
                local_path: staging,
            }),
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                Err(e)
            }
        }
    }

    async fn stream_to(
        &self,
        response: reqwest::Response,
        path: &Path,
    ) -> std::result::Result<u64, AttemptError> {
        let storage = |e: std::io::Error| {
            AttemptError::Permanent(DownloadError::Storage {
                message: format!("{}: {e}", path.display()),
            })
        };

        tokio::fs::create_dir_all(&self.config.staging_dir)
            .await
            .map_err(storage)?;
        let mut file = tokio::fs::File::create(path).await.map_err(storage)?;

        let limit = self.config.max_asset_bytes;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AttemptError::Transient(format!("body: {e}")))?;
            written += chunk.len() as u64;
            if written > limit {
                return Err(AttemptError::Permanent(DownloadError::TooLarge { limit }));
            }
            file.write_all(&chunk).await.map_err(storage)?;
        }
        file.flush().await.map_err(storage)?;

        Ok(written)
    }

    fn staging_path(&self) -> PathBuf {
        self.config
            .staging_dir
            .join(format!("{}.part", uuid::Uuid::new_v4()))
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            // Attempts are counted explicitly.
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Only server errors are worth another attempt; 429 is handled before this.
fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
}
