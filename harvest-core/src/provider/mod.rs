//! Search provider adapters.
//!
//! Each adapter turns a [`Query`] into a list of [`ProviderResult`]s for one
//! remote image-search API:
//!
//! - **Unsplash** - `client_id` auth, up to 30 results per call
//! - **Pexels** - `Authorization` header, up to 80 results per call
//! - **Pixabay** - `key` auth, 3 to 200 results per call
//! - **Google Custom Search** - `key` + `cx`, up to 10 results per call
//! - **Mock** - scripted results for tests
//!
//! ## Quick Start
//!
//! ```no_run
//! use harvest_core::model::Query;
//! use harvest_core::provider::{ProviderFactory, SearchProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! for provider in ProviderFactory::from_env()? {
//!     let results = provider.search(&Query::new("landscape"), 10).await?;
//!     println!("{}: {} results", provider.id(), results.len());
//! }
//! # Ok(())
//! # }
//! ```

mod factory;
mod google;
pub mod http_client;
mod mock;
mod pexels;
mod pixabay;
mod unsplash;

pub use factory::{ProviderConfig, ProviderFactory, PROVIDER_IDS};
pub use google::{GoogleConfig, GoogleProvider};
pub use http_client::{ProviderHttpClient, ProviderHttpConfig};
pub use mock::MockProvider;
pub use pexels::{PexelsConfig, PexelsProvider};
pub use pixabay::{PixabayConfig, PixabayProvider};
pub use unsplash::{UnsplashConfig, UnsplashProvider};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{HarvestError, ProviderError, Result};
use crate::model::{ProviderResult, Query};

/// Trait for image search providers.
///
/// Implementations must be thread-safe (`Send + Sync`) and stateless between
/// calls. Transient network failures are retried internally; whatever error
/// comes back is final for this call.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Stable identifier, used as `ProviderResult::provider_id` and in reports.
    fn id(&self) -> &str;

    /// Search for at most `max_results` images matching `query`.
    async fn search(
        &self,
        query: &Query,
        max_results: usize,
    ) -> std::result::Result<Vec<ProviderResult>, ProviderError>;
}

/// Decode the array at `pointer` item by item, skipping malformed items.
///
/// A missing array is an empty result when `missing_is_empty` is set (Google
/// omits `items` when nothing matched) and a format error otherwise.
pub(crate) fn decode_items<T: DeserializeOwned>(
    provider: &str,
    body: &Value,
    pointer: &str,
    missing_is_empty: bool,
) -> std::result::Result<Vec<T>, ProviderError> {
    let items = match body.pointer(pointer) {
        Some(Value::Array(items)) => items,
        None if missing_is_empty => return Ok(Vec::new()),
        Some(_) => {
            return Err(ProviderError::invalid_format(format!(
                "{provider}: '{pointer}' is not an array"
            )))
        }
        None => {
            return Err(ProviderError::invalid_format(format!(
                "{provider}: response has no '{pointer}' array"
            )))
        }
    };

    let mut decoded = Vec::with_capacity(items.len());
    let mut skipped = 0usize;
    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value::<T>(item.clone()) {
            Ok(value) => decoded.push(value),
            Err(e) => {
                skipped += 1;
                warn!(provider, index, error = %e, "Skipping malformed result item");
            }
        }
    }

    debug!(provider, decoded = decoded.len(), skipped, "Decoded result items");
    Ok(decoded)
}

/// Keep non-empty URLs and apply the caller's cap.
pub(crate) fn finish(mut results: Vec<ProviderResult>, max_results: usize) -> Vec<ProviderResult> {
    results.retain(|r| !r.url.trim().is_empty());
    results.truncate(max_results);
    results
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| HarvestError::ConfigError(format!("{name} environment variable not set")))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Item {
        url: String,
    }

    #[test]
    fn test_decode_items_skips_malformed() {
        let body = json!({ "data": [ { "url": "a" }, { "nope": 1 }, { "url": "b" } ] });
        let items: Vec<Item> = decode_items("test", &body, "/data", false).unwrap();
        let urls: Vec<_> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b"]);
    }

    #[test]
    fn test_decode_items_missing_array() {
        let body = json!({ "other": [] });
        let err = decode_items::<Item>("test", &body, "/data", false).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponseFormat { .. }));

        let items = decode_items::<Item>("test", &body, "/data", true).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_decode_items_wrong_shape() {
        let body = json!({ "data": "not an array" });
        let err = decode_items::<Item>("test", &body, "/data", true).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponseFormat { .. }));
    }

    #[test]
    fn test_finish_drops_empty_urls_and_truncates() {
        let results = vec![
            ProviderResult::new("p", "https://x/1.jpg"),
            ProviderResult::new("p", " "),
            ProviderResult::new("p", "https://x/2.jpg"),
            ProviderResult::new("p", "https://x/3.jpg"),
        ];
        let finished = finish(results, 2);
        assert_eq!(finished.len(), 2);
        assert_eq!(finished[1].url, "https://x/2.jpg");
    }
}
