//! Unsplash search adapter.
//!
//! `GET {api_url}/search/photos?query=..&per_page=..&client_id=..`, reading
//! `results[].urls.raw` with the photo's `width`/`height`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::http_client::{ProviderHttpClient, ProviderHttpConfig};
use super::{decode_items, env_or, finish, required_env, SearchProvider};
use crate::error::{ProviderError, Result};
use crate::model::{Orientation, ProviderResult, Query};

/// Default Unsplash API endpoint.
const DEFAULT_API_URL: &str = "https://api.unsplash.com";

/// Unsplash caps `per_page` at 30.
const MAX_PER_PAGE: usize = 30;

#[derive(Debug, Deserialize)]
struct UnsplashPhoto {
    urls: UnsplashUrls,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct UnsplashUrls {
    raw: String,
}

/// Configuration for the Unsplash adapter.
#[derive(Clone)]
pub struct UnsplashConfig {
    /// API base URL
    pub api_url: String,
    /// Access key, sent as `client_id`
    pub api_key: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl std::fmt::Debug for UnsplashConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsplashConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl UnsplashConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Required: `UNSPLASH_API_KEY`
    /// Optional: `UNSPLASH_API_URL`
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(required_env("UNSPLASH_API_KEY")?)
            .with_api_url(env_or("UNSPLASH_API_URL", DEFAULT_API_URL)))
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

/// Unsplash photo search.
pub struct UnsplashProvider {
    config: UnsplashConfig,
    http: ProviderHttpClient,
}

impl UnsplashProvider {
    pub const ID: &'static str = "unsplash";

    #[instrument(level = "debug", skip_all, fields(api_url = %config.api_url))]
    pub fn new(config: UnsplashConfig) -> Result<Self> {
        let http = ProviderHttpClient::new(
            Self::ID,
            ProviderHttpConfig::new(config.timeout, config.max_retries),
        )?;
        debug!("Unsplash provider created");
        Ok(Self { config, http })
    }
}

#[async_trait]
impl SearchProvider for UnsplashProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    #[instrument(level = "debug", skip(self, query), fields(provider = "unsplash", term = %query.term))]
    async fn search(
        &self,
        query: &Query,
        max_results: usize,
    ) -> std::result::Result<Vec<ProviderResult>, ProviderError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let url = format!("{}/search/photos", self.config.api_url.trim_end_matches('/'));
        let mut params = vec![
            ("query", query.search_text()),
            ("per_page", max_results.min(MAX_PER_PAGE).to_string()),
            ("client_id", self.config.api_key.clone()),
        ];
        if let Some(orientation) = query.orientation {
            let value = match orientation {
                Orientation::Landscape => "landscape",
                Orientation::Portrait => "portrait",
                Orientation::Square => "squarish",
            };
            params.push(("orientation", value.to_string()));
        }

        let body = self.http.get_json(&url, &params, &[]).await?;
        let photos: Vec<UnsplashPhoto> = decode_items(Self::ID, &body, "/results", false)?;

        let results = photos
            .into_iter()
            .map(|photo| ProviderResult {
                provider_id: Self::ID.to_string(),
                url: photo.urls.raw,
                declared_width: photo.width,
                declared_height: photo.height,
            })
            .collect();

        Ok(finish(results, max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_debug_redacts_key() {
        let config = UnsplashConfig::new("super-secret");
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }

    #[tokio::test]
    async fn test_zero_results_skips_request() {
        // Unroutable endpoint: any request would fail.
        let config = UnsplashConfig::new("k").with_api_url("http://127.0.0.1:1");
        let provider = UnsplashProvider::new(config).unwrap();
        let results = provider.search(&Query::new("cats"), 0).await.unwrap();
        assert!(results.is_empty());
    }
}
