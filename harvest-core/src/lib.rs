//! Harvest Core - multi-provider image acquisition library
//!
//! Searches several stock-image providers at once, drops near-duplicate
//! images with a persistent perceptual-hash registry, downloads survivors under
//! a bounded concurrency budget and renders exact-size variants for social
//! platforms.
//!
//! # Features
//!
//! - Unsplash, Pexels, Pixabay and Google Custom Search adapters
//! - Retry with exponential backoff and `Retry-After` handling
//! - 32×32 mean-threshold perceptual hashing (1024 bits) on a CPU pool
//! - Append-only JSON-lines hash registry with atomic check-then-add
//! - Partial reports on cancellation, deadline or registry failure
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use harvest_core::{AcquisitionConfig, Acquirer, HashRegistry, MemoryAssetStore, MockProvider, Query};
//!
//! # async fn example() -> Result<(), harvest_core::RunError> {
//! let provider = MockProvider::with_urls("mock", [("https://img.example/1.jpg", 1080, 1080)]);
//! let acquirer = Acquirer::new(
//!     vec![Arc::new(provider)],
//!     Arc::new(HashRegistry::in_memory()),
//!     Arc::new(MemoryAssetStore::new()),
//! );
//!
//! let config = AcquisitionConfig::default();
//! let report = acquirer.acquire(&Query::new("landscape"), &config).await?;
//! println!("accepted {} images", report.accepted.len());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod download;
pub mod error;
pub mod hash;
pub mod model;
pub mod pipeline;
pub mod pool;
pub mod provider;
pub mod registry;
pub mod render;
pub mod storage;

// Re-export main types for convenience
pub use aggregate::{aggregate, aggregate_with_stats, AggregateStats};
pub use config::AcquisitionConfig;
pub use download::{DownloadConfig, DownloadGauge, Downloader};
pub use error::{DownloadError, HarvestError, ProviderError, Result, RunError};
pub use hash::{hamming_similarity, HashAlgorithm, PerceptualHash, PerceptualHasher};
pub use model::{
    platform_preset, platform_presets, Asset, Candidate, Orientation, ProviderResult, Query, Size,
    Variant, PLATFORM_PRESETS,
};
pub use pipeline::{
    acquire_media, AcceptedAsset, Acquirer, AcquisitionEvent, AcquisitionReport, CandidateState,
};
pub use pool::WorkerPool;
pub use provider::{MockProvider, ProviderFactory, SearchProvider};
pub use registry::{Admission, FileHashLog, HashLog, HashRegistry, MemoryHashLog};
pub use render::{RenderOutcome, VariantRenderer};
pub use storage::{AssetStore, FsAssetStore, MemoryAssetStore};
