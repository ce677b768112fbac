//! Shared HTTP client for provider search APIs, with retry and backoff.
//!
//! Every adapter funnels its request through [`ProviderHttpClient::get_json`],
//! which owns status classification:
//!
//! - timeouts, connect errors, 5xx: retried with exponential backoff
//! - 429 (or an error status with `X-RateLimit-Remaining: 0`): `RateLimited`
//! - 401/403 and other 4xx: `Unavailable`
//! - a body that is not JSON: `InvalidResponseFormat`

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use backoff::{future::retry_notify, ExponentialBackoff};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{HarvestError, ProviderError, Result};

/// Wait applied when a provider rate-limits without saying for how long.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

/// `X-RateLimit-Reset` values above this are UNIX timestamps, not deltas.
const UNIX_TIMESTAMP_FLOOR: i64 = 1_000_000_000;

/// Configuration for a provider HTTP client.
#[derive(Debug, Clone)]
pub struct ProviderHttpConfig {
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retry attempts for transient errors.
    pub max_retries: u32,
    /// Initial retry interval.
    pub initial_interval: Duration,
    /// Maximum retry interval.
    pub max_interval: Duration,
    pub user_agent: String,
}

impl Default for ProviderHttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            user_agent: concat!("harvest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ProviderHttpConfig {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
            ..Default::default()
        }
    }
}

/// HTTP client bound to one provider, used for its JSON search endpoint.
pub struct ProviderHttpClient {
    provider: &'static str,
    client: Client,
    config: ProviderHttpConfig,
}

impl ProviderHttpClient {
    /// Create a new HTTP client with the given configuration.
    pub fn new(provider: &'static str, config: ProviderHttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| {
                HarvestError::ConfigError(format!("Failed to create {provider} HTTP client: {e}"))
            })?;

        Ok(Self {
            provider,
            client,
            config,
        })
    }

    /// GET `url` and parse the body as JSON, retrying transient failures.
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> std::result::Result<Value, ProviderError> {
        let attempts = AtomicU32::new(0);

        retry_notify(
            self.build_backoff(),
            || {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                async move {
                    self.fetch_once(url, query, headers)
                        .await
                        .map_err(|err| match err {
                            backoff::Error::Transient { err, .. }
                                if attempt > self.config.max_retries =>
                            {
                                backoff::Error::permanent(err)
                            }
                            other => other,
                        })
                }
            },
            |err: ProviderError, duration: Duration| {
                warn!(
                    provider = self.provider,
                    error = %err,
                    retry_after_ms = duration.as_millis() as u64,
                    "Retry scheduled"
                );
            },
        )
        .await
    }

    async fn fetch_once(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> std::result::Result<Value, backoff::Error<ProviderError>> {
        let start = Instant::now();

        let mut request = self.client.get(url).query(query);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            let latency_ms = start.elapsed().as_millis() as u64;
            let err = ProviderError::unavailable(format!("{} request failed: {e}", self.provider));
            if is_transient_error(&e) {
                warn!(provider = self.provider, error = %e, latency_ms, "Transient error, will retry");
                backoff::Error::transient(err)
            } else {
                warn!(provider = self.provider, error = %e, latency_ms, "Permanent error, aborting");
                backoff::Error::permanent(err)
            }
        })?;

        let status = response.status();
        let remaining = header_str(response.headers(), "x-ratelimit-remaining");
        debug!(
            provider = self.provider,
            status = %status,
            ratelimit_remaining = remaining.unwrap_or("-"),
            "Received HTTP response"
        );

        if !status.is_success() {
            let latency_ms = start.elapsed().as_millis() as u64;
            let exhausted = remaining.map(str::trim) == Some("0");

            if status == StatusCode::TOO_MANY_REQUESTS || (exhausted && status.is_client_error()) {
                let retry_after =
                    retry_after_from_headers(response.headers(), chrono::Utc::now().timestamp())
                        .unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
                warn!(
                    provider = self.provider,
                    status = %status,
                    retry_after_secs = retry_after.as_secs(),
                    "Rate limited"
                );
                return Err(backoff::Error::permanent(ProviderError::RateLimited {
                    retry_after,
                }));
            }

            let err = ProviderError::unavailable(format!(
                "{} API returned status: {status}",
                self.provider
            ));
            return if is_transient_status(status) {
                warn!(provider = self.provider, status = %status, latency_ms, "Transient HTTP status, will retry");
                Err(backoff::Error::transient(err))
            } else {
                warn!(provider = self.provider, status = %status, latency_ms, "Permanent HTTP error");
                Err(backoff::Error::permanent(err))
            };
        }

        let body: Value = response.json().await.map_err(|e| {
            warn!(provider = self.provider, error = %e, "Failed to parse JSON response");
            backoff::Error::permanent(ProviderError::invalid_format(format!(
                "{} returned a non-JSON body: {e}",
                self.provider
            )))
        })?;

        debug!(
            provider = self.provider,
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed successfully"
        );

        Ok(body)
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_interval,
            max_interval: self.config.max_interval,
            max_elapsed_time: Some(self.config.timeout * (self.config.max_retries + 1)),
            ..Default::default()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Delay requested by a rate-limited response.
///
/// `Retry-After` wins (delta seconds or an HTTP date); otherwise
/// `X-RateLimit-Reset` is read as delta seconds, or as a UNIX timestamp when
/// it is larger than 10^9. `now_unix` anchors both absolute forms.
pub fn retry_after_from_headers(headers: &HeaderMap, now_unix: i64) -> Option<Duration> {
    if let Some(value) = header_str(headers, "retry-after").map(str::trim) {
        if let Ok(secs) = value.parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }
        if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
            let delta = (date.timestamp() - now_unix).max(0);
            return Some(Duration::from_secs(delta as u64));
        }
    }

    let reset = header_str(headers, "x-ratelimit-reset")?
        .trim()
        .parse::<i64>()
        .ok()?;
    let secs = if reset > UNIX_TIMESTAMP_FLOOR {
        (reset - now_unix).max(0)
    } else {
        reset.max(0)
    };
    Some(Duration::from_secs(secs as u64))
}

/// Check if a reqwest error is transient and should be retried.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

/// Check if an HTTP status code indicates a transient error.
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_transient_status_codes() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::TOO_MANY_REQUESTS));
    }

    #[test]
    fn test_retry_after_seconds() {
        let h = headers(&[("retry-after", "7")]);
        assert_eq!(retry_after_from_headers(&h, 0), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_retry_after_http_date() {
        let h = headers(&[("retry-after", "Thu, 01 Jan 1970 00:01:40 +0000")]);
        assert_eq!(retry_after_from_headers(&h, 40), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_ratelimit_reset_delta_and_timestamp() {
        let h = headers(&[("x-ratelimit-reset", "30")]);
        assert_eq!(retry_after_from_headers(&h, 1_700_000_000), Some(Duration::from_secs(30)));

        let h = headers(&[("x-ratelimit-reset", "1700000045")]);
        assert_eq!(retry_after_from_headers(&h, 1_700_000_000), Some(Duration::from_secs(45)));

        // A reset already in the past means "now".
        let h = headers(&[("x-ratelimit-reset", "1600000000")]);
        assert_eq!(retry_after_from_headers(&h, 1_700_000_000), Some(Duration::ZERO));
    }

    #[test]
    fn test_retry_after_missing() {
        assert_eq!(retry_after_from_headers(&HeaderMap::new(), 0), None);
        let h = headers(&[("retry-after", "soon")]);
        assert_eq!(retry_after_from_headers(&h, 0), None);
    }

    #[test]
    fn test_default_config() {
        let config = ProviderHttpConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.user_agent.starts_with("harvest/"));
    }
}
