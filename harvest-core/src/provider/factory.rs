//! Provider construction from configuration or the environment.

use std::sync::Arc;

use tracing::{debug, info};

use super::{
    GoogleConfig, GoogleProvider, MockProvider, PexelsConfig, PexelsProvider, PixabayConfig,
    PixabayProvider, SearchProvider, UnsplashConfig, UnsplashProvider,
};
use crate::error::{HarvestError, Result};
use crate::model::ProviderResult;

/// Ids of the built-in network providers.
pub const PROVIDER_IDS: &[&str] = &[
    UnsplashProvider::ID,
    PexelsProvider::ID,
    PixabayProvider::ID,
    GoogleProvider::ID,
];

/// Configuration for creating search providers.
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Unsplash(UnsplashConfig),
    Pexels(PexelsConfig),
    Pixabay(PixabayConfig),
    Google(GoogleConfig),
    /// Mock provider (testing only)
    Mock {
        id: String,
        results: Vec<ProviderResult>,
    },
}

/// Factory for creating search providers.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a search provider from configuration.
    pub fn create(config: ProviderConfig) -> Result<Arc<dyn SearchProvider>> {
        match config {
            ProviderConfig::Unsplash(c) => Ok(Arc::new(UnsplashProvider::new(c)?)),
            ProviderConfig::Pexels(c) => Ok(Arc::new(PexelsProvider::new(c)?)),
            ProviderConfig::Pixabay(c) => Ok(Arc::new(PixabayProvider::new(c)?)),
            ProviderConfig::Google(c) => Ok(Arc::new(GoogleProvider::new(c)?)),
            ProviderConfig::Mock { id, results } => Ok(Arc::new(MockProvider::new(id, results))),
        }
    }

    /// Configurations for every provider whose credentials are present.
    pub fn configs_from_env() -> Vec<ProviderConfig> {
        let mut configs = Vec::new();

        match UnsplashConfig::from_env() {
            Ok(c) => configs.push(ProviderConfig::Unsplash(c)),
            Err(e) => debug!(provider = UnsplashProvider::ID, reason = %e, "Provider not configured"),
        }
        match PexelsConfig::from_env() {
            Ok(c) => configs.push(ProviderConfig::Pexels(c)),
            Err(e) => debug!(provider = PexelsProvider::ID, reason = %e, "Provider not configured"),
        }
        match PixabayConfig::from_env() {
            Ok(c) => configs.push(ProviderConfig::Pixabay(c)),
            Err(e) => debug!(provider = PixabayProvider::ID, reason = %e, "Provider not configured"),
        }
        match GoogleConfig::from_env() {
            Ok(c) => configs.push(ProviderConfig::Google(c)),
            Err(e) => debug!(provider = GoogleProvider::ID, reason = %e, "Provider not configured"),
        }

        configs
    }

    /// Create every provider whose credentials are present in the environment.
    ///
    /// An empty list is not an error here; callers decide whether they can
    /// run without providers.
    pub fn from_env() -> Result<Vec<Arc<dyn SearchProvider>>> {
        let providers = Self::configs_from_env()
            .into_iter()
            .map(Self::create)
            .collect::<Result<Vec<_>>>()?;

        info!(
            providers = ?providers.iter().map(|p| p.id().to_string()).collect::<Vec<_>>(),
            "Search providers configured"
        );
        Ok(providers)
    }

    /// Keep only providers whose id is listed in `only` (all when empty).
    pub fn select(
        providers: Vec<Arc<dyn SearchProvider>>,
        only: &[String],
    ) -> Result<Vec<Arc<dyn SearchProvider>>> {
        if only.is_empty() {
            return Ok(providers);
        }
        if let Some(unknown) = only.iter().find(|name| !PROVIDER_IDS.contains(&name.as_str())) {
            return Err(HarvestError::ConfigError(format!(
                "Unknown provider '{unknown}' (known: {})",
                PROVIDER_IDS.join(", ")
            )));
        }
        Ok(providers
            .into_iter()
            .filter(|p| only.iter().any(|name| name == p.id()))
            .collect())
    }
}
