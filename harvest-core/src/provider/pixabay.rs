//! Pixabay search adapter.
//!
//! `GET {api_url}/?key=..&q=..&image_type=photo&per_page=..`. Pixabay only
//! accepts `per_page` in `3..=200`, so small requests are padded and the
//! surplus dropped locally.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::http_client::{ProviderHttpClient, ProviderHttpConfig};
use super::{decode_items, env_or, finish, required_env, SearchProvider};
use crate::error::{ProviderError, Result};
use crate::model::{Orientation, ProviderResult, Query};

const DEFAULT_API_URL: &str = "https://pixabay.com/api/";

const MIN_PER_PAGE: usize = 3;
const MAX_PER_PAGE: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PixabayHit {
    #[serde(rename = "largeImageURL")]
    large_image_url: Option<String>,
    #[serde(rename = "webformatURL")]
    webformat_url: Option<String>,
    image_width: Option<u32>,
    image_height: Option<u32>,
}

/// Configuration for the Pixabay adapter.
#[derive(Clone)]
pub struct PixabayConfig {
    pub api_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl std::fmt::Debug for PixabayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixabayConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl PixabayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    /// Required: `PIXABAY_API_KEY`
    /// Optional: `PIXABAY_API_URL`
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(required_env("PIXABAY_API_KEY")?)
            .with_api_url(env_or("PIXABAY_API_URL", DEFAULT_API_URL)))
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

/// Pixabay photo search.
pub struct PixabayProvider {
    config: PixabayConfig,
    http: ProviderHttpClient,
}

impl PixabayProvider {
    pub const ID: &'static str = "pixabay";

    #[instrument(level = "debug", skip_all, fields(api_url = %config.api_url))]
    pub fn new(config: PixabayConfig) -> Result<Self> {
        let http = ProviderHttpClient::new(
            Self::ID,
            ProviderHttpConfig::new(config.timeout, config.max_retries),
        )?;
        debug!("Pixabay provider created");
        Ok(Self { config, http })
    }
}

#[async_trait]
impl SearchProvider for PixabayProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    #[instrument(level = "debug", skip(self, query), fields(provider = "pixabay", term = %query.term))]
    async fn search(
        &self,
        query: &Query,
        max_results: usize,
    ) -> std::result::Result<Vec<ProviderResult>, ProviderError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let mut params = vec![
            ("key", self.config.api_key.clone()),
            ("q", query.search_text()),
            ("image_type", "photo".to_string()),
            (
                "per_page",
                max_results.clamp(MIN_PER_PAGE, MAX_PER_PAGE).to_string(),
            ),
        ];
        match query.orientation {
            Some(Orientation::Landscape) => params.push(("orientation", "horizontal".to_string())),
            Some(Orientation::Portrait) => params.push(("orientation", "vertical".to_string())),
            // No square filter on Pixabay.
            Some(Orientation::Square) | None => {}
        }

        let body = self.http.get_json(&self.config.api_url, &params, &[]).await?;
        let hits: Vec<PixabayHit> = decode_items(Self::ID, &body, "/hits", false)?;

        let results = hits
            .into_iter()
            .filter_map(|hit| {
                let url = hit.large_image_url.or(hit.webformat_url)?;
                Some(ProviderResult {
                    provider_id: Self::ID.to_string(),
                    url,
                    declared_width: hit.image_width,
                    declared_height: hit.image_height,
                })
            })
            .collect();

        Ok(finish(results, max_results))
    }
}
