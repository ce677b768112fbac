//! Acquisition run configuration.
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::download::DownloadConfig;
use crate::error::{HarvestError, Result};
use crate::hash::HashAlgorithm;
use crate::model::{validate_platform_name, Size};

/// Registry file name inside the output directory.
pub const REGISTRY_FILE_NAME: &str = "downloaded_hashes.jsonl";

/// Settings for one `acquire` run.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Results requested from each provider (default: 10)
    pub per_provider_limit: usize,
    /// Download attempts in flight at once (default: 10)
    pub max_concurrent_downloads: usize,
    /// Platform name to exact pixel size. Empty = no size filter, no variants.
    pub target_platforms: BTreeMap<String, Size>,
    /// Hamming similarity at or above which an image is a duplicate (default: 0.95)
    pub similarity_threshold: f64,
    /// Drop candidates whose declared size matches no platform (default: true)
    pub exact_size_filter: bool,
    pub hash_algorithm: HashAlgorithm,
    /// CPU workers for hashing and resizing (0 = one per core)
    pub cpu_workers: usize,
    /// Root of the asset store (default: `downloaded_images`)
    pub output_dir: PathBuf,
    /// Hash log location (default: `<output_dir>/downloaded_hashes.jsonl`)
    pub registry_path: Option<PathBuf>,
    /// Wall-clock limit for the whole run
    pub deadline: Option<Duration>,
    /// Longest wait honoured for a rate-limited provider search (default: 60s)
    pub provider_rate_limit_cap: Duration,
    pub download: DownloadConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            per_provider_limit: 10,
            max_concurrent_downloads: 10,
            target_platforms: BTreeMap::new(),
            similarity_threshold: 0.95,
            exact_size_filter: true,
            hash_algorithm: HashAlgorithm::default(),
            cpu_workers: 0,
            output_dir: PathBuf::from("downloaded_images"),
            registry_path: None,
            deadline: None,
            provider_rate_limit_cap: Duration::from_secs(60),
            download: DownloadConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl AcquisitionConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let per_provider_limit =
            env_parse("HARVEST_PER_PROVIDER_LIMIT").unwrap_or(defaults.per_provider_limit);

        let max_concurrent_downloads = env_parse("HARVEST_MAX_CONCURRENT_DOWNLOADS")
            .unwrap_or(defaults.max_concurrent_downloads);

        let similarity_threshold =
            env_parse("HARVEST_SIMILARITY_THRESHOLD").unwrap_or(defaults.similarity_threshold);

        let output_dir = std::env::var("HARVEST_OUTPUT_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);

        let registry_path = std::env::var("HARVEST_REGISTRY_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let cpu_workers = env_parse("HARVEST_CPU_WORKERS").unwrap_or(defaults.cpu_workers);

        let mut download = defaults.download;
        if let Some(secs) = env_parse::<u64>("HARVEST_DOWNLOAD_TIMEOUT_SECS") {
            download.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = env_parse("HARVEST_MAX_RETRIES") {
            download.max_retries = retries;
        }
        if let Some(mb) = env_parse::<u64>("HARVEST_MAX_ASSET_MB") {
            download.max_asset_bytes = mb * 1024 * 1024;
        }

        Self {
            per_provider_limit,
            max_concurrent_downloads,
            similarity_threshold,
            output_dir,
            registry_path,
            cpu_workers,
            download,
            ..defaults
        }
    }

    pub fn with_platform(mut self, name: impl Into<String>, size: Size) -> Self {
        self.target_platforms.insert(name.into(), size);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Where the hash log lives for this configuration.
    pub fn registry_path(&self) -> PathBuf {
        self.registry_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(REGISTRY_FILE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == 0 {
            return Err(HarvestError::ConfigError(
                "max_concurrent_downloads must be at least 1".into(),
            ));
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(HarvestError::ConfigError(format!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.download.max_asset_bytes == 0 {
            return Err(HarvestError::ConfigError(
                "max_asset_bytes must be positive".into(),
            ));
        }
        for (name, size) in &self.target_platforms {
            validate_platform_name(name)?;
            if size.width == 0 || size.height == 0 {
                return Err(HarvestError::ConfigError(format!(
                    "Platform '{name}' has an empty size {size}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AcquisitionConfig::default();
        assert_eq!(config.per_provider_limit, 10);
        assert_eq!(config.max_concurrent_downloads, 10);
        assert_eq!(config.similarity_threshold, 0.95);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.registry_path(),
            PathBuf::from("downloaded_images").join("downloaded_hashes.jsonl")
        );
    }

    #[test]
    fn test_explicit_registry_path() {
        let config = AcquisitionConfig {
            registry_path: Some(PathBuf::from("/tmp/h.jsonl")),
            ..Default::default()
        };
        assert_eq!(config.registry_path(), PathBuf::from("/tmp/h.jsonl"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_concurrency = AcquisitionConfig {
            max_concurrent_downloads: 0,
            ..Default::default()
        };
        assert!(zero_concurrency.validate().is_err());

        let bad_threshold = AcquisitionConfig {
            similarity_threshold: 1.5,
            ..Default::default()
        };
        assert!(bad_threshold.validate().is_err());

        let bad_platform = AcquisitionConfig::default().with_platform("a/b", Size::new(1, 1));
        assert!(bad_platform.validate().is_err());
    }
}
