//! Google Custom Search (image mode) adapter.
//!
//! Requires both an API key and a programmable search engine id (`cx`).
//! Google omits `items` entirely when nothing matched.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::http_client::{ProviderHttpClient, ProviderHttpConfig};
use super::{decode_items, env_or, finish, required_env, SearchProvider};
use crate::error::{ProviderError, Result};
use crate::model::{ProviderResult, Query};

const DEFAULT_API_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Custom Search returns at most 10 items per call.
const MAX_NUM: usize = 10;

#[derive(Debug, Deserialize)]
struct GoogleItem {
    link: String,
    image: Option<GoogleImage>,
}

#[derive(Debug, Deserialize)]
struct GoogleImage {
    width: Option<u32>,
    height: Option<u32>,
}

/// Configuration for the Google Custom Search adapter.
#[derive(Clone)]
pub struct GoogleConfig {
    pub api_url: String,
    pub api_key: String,
    /// Programmable search engine id
    pub search_engine_id: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl std::fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("search_engine_id", &self.search_engine_id)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl GoogleConfig {
    pub fn new(api_key: impl Into<String>, search_engine_id: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
            search_engine_id: search_engine_id.into(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    /// Required: `GOOGLE_API_KEY`, `GOOGLE_SEARCH_ENGINE_ID`
    /// Optional: `GOOGLE_API_URL`
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(
            required_env("GOOGLE_API_KEY")?,
            required_env("GOOGLE_SEARCH_ENGINE_ID")?,
        )
        .with_api_url(env_or("GOOGLE_API_URL", DEFAULT_API_URL)))
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

/// Google image search.
pub struct GoogleProvider {
    config: GoogleConfig,
    http: ProviderHttpClient,
}

impl GoogleProvider {
    pub const ID: &'static str = "google";

    #[instrument(level = "debug", skip_all, fields(api_url = %config.api_url))]
    pub fn new(config: GoogleConfig) -> Result<Self> {
        let http = ProviderHttpClient::new(
            Self::ID,
            ProviderHttpConfig::new(config.timeout, config.max_retries),
        )?;
        debug!("Google provider created");
        Ok(Self { config, http })
    }
}

#[async_trait]
impl SearchProvider for GoogleProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    #[instrument(level = "debug", skip(self, query), fields(provider = "google", term = %query.term))]
    async fn search(
        &self,
        query: &Query,
        max_results: usize,
    ) -> std::result::Result<Vec<ProviderResult>, ProviderError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let params = [
            ("key", self.config.api_key.clone()),
            ("cx", self.config.search_engine_id.clone()),
            ("q", query.search_text()),
            ("searchType", "image".to_string()),
            ("num", max_results.min(MAX_NUM).to_string()),
        ];

        let body = self.http.get_json(&self.config.api_url, &params, &[]).await?;
        let items: Vec<GoogleItem> = decode_items(Self::ID, &body, "/items", true)?;

        let results = items
            .into_iter()
            .map(|item| {
                let (w, h) = item
                    .image
                    .map(|img| (img.width, img.height))
                    .unwrap_or((None, None));
                ProviderResult {
                    provider_id: Self::ID.to_string(),
                    url: item.link,
                    declared_width: w,
                    declared_height: h,
                }
            })
            .collect();

        Ok(finish(results, max_results))
    }
}
