//! Pexels search adapter.
//!
//! [Pexels API Documentation](https://www.pexels.com/api/documentation/)

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::http_client::{ProviderHttpClient, ProviderHttpConfig};
use super::{decode_items, env_or, finish, required_env, SearchProvider};
use crate::error::{ProviderError, Result};
use crate::model::{Orientation, ProviderResult, Query};

const DEFAULT_API_URL: &str = "https://api.pexels.com/v1";

/// Pexels max is 80.
const MAX_PER_PAGE: usize = 80;

#[derive(Debug, Deserialize)]
struct PexelsPhoto {
    src: PexelsSrc,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PexelsSrc {
    original: String,
}

/// Configuration for the Pexels adapter.
#[derive(Clone)]
pub struct PexelsConfig {
    pub api_url: String,
    /// API key, sent verbatim in the `Authorization` header
    pub api_key: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl std::fmt::Debug for PexelsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PexelsConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl PexelsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    /// Required: `PEXELS_API_KEY`
    /// Optional: `PEXELS_API_URL`
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(required_env("PEXELS_API_KEY")?)
            .with_api_url(env_or("PEXELS_API_URL", DEFAULT_API_URL)))
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

/// Pexels photo search.
pub struct PexelsProvider {
    config: PexelsConfig,
    http: ProviderHttpClient,
}

impl PexelsProvider {
    pub const ID: &'static str = "pexels";

    #[instrument(level = "debug", skip_all, fields(api_url = %config.api_url))]
    pub fn new(config: PexelsConfig) -> Result<Self> {
        let http = ProviderHttpClient::new(
            Self::ID,
            ProviderHttpConfig::new(config.timeout, config.max_retries),
        )?;
        debug!("Pexels provider created");
        Ok(Self { config, http })
    }
}

#[async_trait]
impl SearchProvider for PexelsProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    #[instrument(level = "debug", skip(self, query), fields(provider = "pexels", term = %query.term))]
    async fn search(
        &self,
        query: &Query,
        max_results: usize,
    ) -> std::result::Result<Vec<ProviderResult>, ProviderError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let url = format!("{}/search", self.config.api_url.trim_end_matches('/'));
        let mut params = vec![
            ("query", query.search_text()),
            ("per_page", max_results.min(MAX_PER_PAGE).to_string()),
        ];
        if let Some(orientation) = query.orientation {
            let value = match orientation {
                Orientation::Landscape => "landscape",
                Orientation::Portrait => "portrait",
                Orientation::Square => "square",
            };
            params.push(("orientation", value.to_string()));
        }
        let headers = [("Authorization", self.config.api_key.as_str())];

        let body = self.http.get_json(&url, &params, &headers).await?;
        let photos: Vec<PexelsPhoto> = decode_items(Self::ID, &body, "/photos", false)?;

        let results = photos
            .into_iter()
            .map(|photo| ProviderResult {
                provider_id: Self::ID.to_string(),
                url: photo.src.original,
                declared_width: photo.width,
                declared_height: photo.height,
            })
            .collect();

        Ok(finish(results, max_results))
    }
}
