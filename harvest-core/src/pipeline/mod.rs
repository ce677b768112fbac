//! Acquisition orchestrator.
//!
//! Wires providers, aggregation, the bounded downloader, hashing, the
//! registry gate and variant rendering into one run:
//!
//! ```text
//! Query -> [provider search] x N -> aggregate -> download -> hash -> admit -> render -> report
//! ```
//!
//! Provider and candidate failures are folded into the [`AcquisitionReport`];
//! only cancellation and registry persistence failures end a run early, and
//! both still hand back the partial report.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use harvest_core::config::AcquisitionConfig;
//! use harvest_core::model::Query;
//! use harvest_core::pipeline::Acquirer;
//! use harvest_core::provider::ProviderFactory;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AcquisitionConfig::from_env();
//! let acquirer = Acquirer::open(ProviderFactory::from_env()?, &config).await?;
//! let report = acquirer.acquire(&Query::new("landscape"), &config).await?;
//! println!("{} accepted, {} duplicates", report.accepted.len(), report.duplicates_skipped);
//! # Ok(())
//! # }
//! ```

mod events;
mod report;
mod state;

pub use events::AcquisitionEvent;
pub use report::{
    AcceptedAsset, AcquisitionReport, CandidateOutcome, DownloadFailure, ProviderFailure,
};
pub use state::CandidateState;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::aggregate::aggregate_with_stats;
use crate::config::AcquisitionConfig;
use crate::download::Downloader;
use crate::error::{DownloadError, HarvestError, ProviderError, RunError};
use crate::hash::{PerceptualHash, PerceptualHasher};
use crate::model::{Asset, Candidate, ProviderResult, Query, Size};
use crate::pool::WorkerPool;
use crate::provider::{ProviderFactory, SearchProvider};
use crate::registry::{Admission, FileHashLog, HashRegistry};
use crate::render::VariantRenderer;
use crate::storage::{content_key, AssetStore, FsAssetStore};

/// Runs acquisitions against a fixed set of providers, registry and store.
pub struct Acquirer {
    providers: Vec<Arc<dyn SearchProvider>>,
    registry: Arc<HashRegistry>,
    store: Arc<dyn AssetStore>,
    events: Option<UnboundedSender<AcquisitionEvent>>,
    cancel: CancellationToken,
}

/// Per-run collaborators shared by every candidate task.
struct RunContext<'a> {
    config: &'a AcquisitionConfig,
    platforms: &'a BTreeMap<String, Size>,
    downloader: Downloader,
    renderer: VariantRenderer,
    pool: WorkerPool,
    hasher: PerceptualHasher,
    token: CancellationToken,
    /// First registry persistence failure, if any.
    fatal: Mutex<Option<String>>,
}

/// What happened to one candidate.
enum Processed {
    /// Cancelled before anything was fetched.
    Skipped,
    DownloadFailed(DownloadFailure),
    Duplicate,
    Accepted {
        accepted: AcceptedAsset,
        hash_failed: bool,
    },
    /// The registry could not persist an accepted hash.
    RegistryFailed,
}

/// Tracks one candidate's state and publishes every transition.
struct Tracker<'a> {
    url: &'a str,
    state: CandidateState,
    events: Option<&'a UnboundedSender<AcquisitionEvent>>,
}

impl Tracker<'_> {
    fn advance(&mut self, next: CandidateState) {
        match self.state.advance(next) {
            Some(state) => {
                self.state = state;
                if let Some(tx) = self.events {
                    let _ = tx.send(AcquisitionEvent::StateChanged {
                        url: self.url.to_string(),
                        state,
                    });
                }
            }
            None => warn!(url = self.url, from = %self.state, to = %next, "Invalid candidate transition"),
        }
    }
}

impl Acquirer {
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        registry: Arc<HashRegistry>,
        store: Arc<dyn AssetStore>,
    ) -> Self {
        Self {
            providers,
            registry,
            store,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// File-backed registry and store under `config.output_dir`.
    pub async fn open(
        providers: Vec<Arc<dyn SearchProvider>>,
        config: &AcquisitionConfig,
    ) -> crate::Result<Self> {
        let registry = HashRegistry::open(FileHashLog::new(config.registry_path())).await?;
        let store = FsAssetStore::new(&config.output_dir);
        Ok(Self::new(providers, Arc::new(registry), Arc::new(store)))
    }

    /// Publish progress events on `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<AcquisitionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Abort runs when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &Arc<HashRegistry> {
        &self.registry
    }

    fn emit(&self, event: AcquisitionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Run one acquisition.
    ///
    /// Returns the report, or `RunError` carrying the partial report when the
    /// run was cancelled or the registry could not be written.
    #[instrument(skip_all, fields(term = %query.term, providers = self.providers.len()))]
    pub async fn acquire(
        &self,
        query: &Query,
        config: &AcquisitionConfig,
    ) -> Result<AcquisitionReport, RunError> {
        let start = Instant::now();
        config.validate()?;

        let platforms = query
            .target_platforms
            .clone()
            .unwrap_or_else(|| config.target_platforms.clone());
        for name in platforms.keys() {
            crate::model::validate_platform_name(name)?;
        }

        let pool = WorkerPool::new(config.cpu_workers)?;
        let ctx = RunContext {
            config,
            platforms: &platforms,
            downloader: Downloader::new(config.download.clone(), config.max_concurrent_downloads)?,
            renderer: VariantRenderer::new(Arc::clone(&self.store), pool.clone()),
            pool,
            hasher: PerceptualHasher::new(config.hash_algorithm),
            token: self.cancel.child_token(),
            fatal: Mutex::new(None),
        };

        let deadline = config.deadline.map(|limit| {
            let token = ctx.token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!(deadline_ms = limit.as_millis() as u64, "Run deadline reached");
                token.cancel();
            })
        });

        info!(platforms = platforms.len(), "Acquisition started");
        let mut report = AcquisitionReport::default();

        // Search
        let searches = self
            .providers
            .iter()
            .map(|provider| self.search_provider(provider.as_ref(), query, &ctx));
        let mut all_results = Vec::with_capacity(self.providers.len());
        for (provider, outcome) in self.providers.iter().zip(join_all(searches).await) {
            match outcome {
                Ok(results) => {
                    self.emit(AcquisitionEvent::ProviderSearched {
                        provider: provider.id().to_string(),
                        results: results.len(),
                    });
                    all_results.push(results);
                }
                Err(error) => {
                    warn!(provider = provider.id(), error = %error, "Provider search failed");
                    self.emit(AcquisitionEvent::ProviderFailed {
                        provider: provider.id().to_string(),
                        error: error.clone(),
                    });
                    report.provider_errors.push(ProviderFailure {
                        provider: provider.id().to_string(),
                        error,
                    });
                }
            }
        }

        // Aggregate
        let no_filter = BTreeMap::new();
        let size_filter = if config.exact_size_filter {
            &platforms
        } else {
            &no_filter
        };
        let (candidates, stats) = aggregate_with_stats(all_results, size_filter);
        report.candidates_discovered = candidates.len();
        self.emit(AcquisitionEvent::CandidatesAggregated {
            candidates: candidates.len(),
            url_duplicates: stats.url_duplicates,
            size_rejected: stats.size_rejected,
        });
        info!(
            candidates = candidates.len(),
            url_duplicates = stats.url_duplicates,
            size_rejected = stats.size_rejected,
            "Candidates aggregated"
        );

        // Download, hash, admit, render
        let mut in_flight: FuturesUnordered<_> = candidates
            .into_iter()
            .map(|candidate| self.process(candidate, &ctx))
            .collect();

        while let Some((outcome, processed)) = in_flight.next().await {
            match processed {
                Processed::Skipped => continue,
                Processed::DownloadFailed(failure) => report.download_errors.push(failure),
                Processed::Duplicate => report.duplicates_skipped += 1,
                Processed::Accepted {
                    accepted,
                    hash_failed,
                } => {
                    if hash_failed {
                        report.hash_failures += 1;
                    }
                    report.render_errors += accepted.render_failures.len();
                    report.accepted.push(accepted);
                }
                Processed::RegistryFailed => {}
            }
            report.outcomes.push(outcome);
        }

        if let Some(handle) = deadline {
            handle.abort();
        }

        report.elapsed = start.elapsed();
        report.peak_concurrent_downloads = ctx.downloader.gauge().peak();

        let fatal = ctx.fatal.lock().ok().and_then(|mut f| f.take());
        if let Some(message) = fatal {
            warn!(error = %message, "Run aborted: registry persistence failed");
            return Err(RunError::Registry {
                message,
                report: Box::new(report),
            });
        }

        if ctx.token.is_cancelled() {
            report.cancelled = true;
            self.emit(AcquisitionEvent::Cancelled);
            info!(
                accepted = report.accepted.len(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Acquisition cancelled"
            );
            return Err(RunError::Cancelled {
                report: Box::new(report),
            });
        }

        info!(
            accepted = report.accepted.len(),
            duplicates = report.duplicates_skipped,
            provider_errors = report.provider_errors.len(),
            download_errors = report.download_errors.len(),
            peak_downloads = report.peak_concurrent_downloads,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Acquisition finished"
        );
        Ok(report)
    }

    /// Search one provider, retrying once after a rate limit.
    async fn search_provider(
        &self,
        provider: &dyn SearchProvider,
        query: &Query,
        ctx: &RunContext<'_>,
    ) -> Result<Vec<ProviderResult>, ProviderError> {
        if ctx.token.is_cancelled() {
            return Ok(Vec::new());
        }

        let limit = query.limit_for(provider.id(), ctx.config.per_provider_limit);
        let start = Instant::now();

        let results = match provider.search(query, limit).await {
            Err(ProviderError::RateLimited { retry_after }) => {
                let wait = retry_after.min(ctx.config.provider_rate_limit_cap);
                info!(
                    provider = provider.id(),
                    wait_ms = wait.as_millis() as u64,
                    "Provider rate limited, retrying once"
                );
                tokio::select! {
                    _ = ctx.token.cancelled() => {
                        return Err(ProviderError::RateLimited { retry_after });
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
                provider.search(query, limit).await
            }
            other => other,
        }?;

        debug!(
            provider = provider.id(),
            results = results.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Provider search completed"
        );
        Ok(results)
    }

    /// Carry one candidate from download to its terminal state.
    async fn process(
        &self,
        candidate: Candidate,
        ctx: &RunContext<'_>,
    ) -> (CandidateOutcome, Processed) {
        let url = candidate.url().to_string();
        let mut tracker = Tracker {
            url: &url,
            state: CandidateState::Discovered,
            events: self.events.as_ref(),
        };

        let processed = self.run_candidate(&candidate, ctx, &mut tracker).await;

        let outcome = CandidateOutcome {
            url: url.clone(),
            provider: candidate.provider_id().to_string(),
            state: tracker.state,
        };
        (outcome, processed)
    }

    async fn run_candidate(
        &self,
        candidate: &Candidate,
        ctx: &RunContext<'_>,
        tracker: &mut Tracker<'_>,
    ) -> Processed {
        if ctx.token.is_cancelled() {
            return Processed::Skipped;
        }

        tracker.advance(CandidateState::Downloading);
        let asset = match ctx.downloader.download(candidate, &ctx.token).await {
            Ok(asset) => asset,
            Err(DownloadError::Cancelled { attempts: 0 }) => return Processed::Skipped,
            Err(error) => return self.download_failed(candidate, tracker, error),
        };
        tracker.advance(CandidateState::Downloaded);

        let staged = asset.local_path.clone();
        let processed = self.admit_and_render(asset, ctx, tracker).await;
        if let Err(e) = tokio::fs::remove_file(&staged).await {
            debug!(path = %staged.display(), error = %e, "Staging file already gone");
        }
        processed
    }

    async fn admit_and_render(
        &self,
        mut asset: Asset,
        ctx: &RunContext<'_>,
        tracker: &mut Tracker<'_>,
    ) -> Processed {
        let candidate = asset.candidate.clone();

        let bytes = match tokio::fs::read(&asset.local_path).await {
            Ok(bytes) => Arc::new(bytes),
            Err(e) => {
                let error = DownloadError::Storage {
                    message: format!("staged file unreadable: {e}"),
                };
                return self.download_failed(&candidate, tracker, error);
            }
        };

        let hash_input = Arc::clone(&bytes);
        let hasher = ctx.hasher;
        let hashed: crate::Result<PerceptualHash> = ctx
            .pool
            .run(move || hasher.hash_bytes(&hash_input))
            .await
            .and_then(|r| r);
        tracker.advance(CandidateState::HashChecked);

        let key = content_key(&bytes, &asset.content_type);
        let (asset_store, key_ref, bytes_ref) = (&self.store, key.as_str(), bytes.as_slice());
        let store = move || async move { asset_store.put(key_ref, bytes_ref).await };

        let (stored_path, hash) = match hashed {
            Ok(hash) => {
                match self
                    .registry
                    .admit(&hash, ctx.config.similarity_threshold, store)
                    .await
                {
                    Ok(Admission::Duplicate { similarity }) => {
                        debug!(url = candidate.url(), similarity, "Near-duplicate skipped");
                        tracker.advance(CandidateState::Duplicate);
                        self.emit(AcquisitionEvent::DuplicateSkipped {
                            url: candidate.url().to_string(),
                            similarity,
                        });
                        return Processed::Duplicate;
                    }
                    Ok(Admission::Accepted(path)) => {
                        self.emit(AcquisitionEvent::HashRegistered {
                            url: candidate.url().to_string(),
                            hash: hash.to_hex(),
                        });
                        (path, Some(hash))
                    }
                    Err(HarvestError::RegistryPersistenceFailed(message)) => {
                        warn!(url = candidate.url(), error = %message, "Registry append failed, stopping run");
                        if let Ok(mut fatal) = ctx.fatal.lock() {
                            fatal.get_or_insert(message);
                        }
                        ctx.token.cancel();
                        return Processed::RegistryFailed;
                    }
                    Err(e) => {
                        let error = DownloadError::Storage {
                            message: e.to_string(),
                        };
                        return self.download_failed(&candidate, tracker, error);
                    }
                }
            }
            Err(e) => {
                // Fail open: keep the asset, skip the duplicate gate.
                warn!(url = candidate.url(), error = %e, "Hash computation failed, accepting without duplicate check");
                match store().await {
                    Ok(path) => (path, None),
                    Err(e) => {
                        let error = DownloadError::Storage {
                            message: e.to_string(),
                        };
                        return self.download_failed(&candidate, tracker, error);
                    }
                }
            }
        };

        tracker.advance(CandidateState::Accepted);
        let hash_failed = hash.is_none();
        asset.local_path = stored_path;

        let mut accepted = AcceptedAsset {
            asset,
            hash,
            variants: Vec::new(),
            render_failures: Vec::new(),
        };

        if ctx.platforms.is_empty() || ctx.token.is_cancelled() {
            return Processed::Accepted {
                accepted,
                hash_failed,
            };
        }

        tracker.advance(CandidateState::Rendering);
        let outcome = ctx
            .renderer
            .render(&accepted.asset, bytes, ctx.platforms)
            .await;

        for variant in &outcome.variants {
            self.emit(AcquisitionEvent::VariantRendered {
                url: candidate.url().to_string(),
                variant: variant.clone(),
            });
        }
        tracker.advance(if outcome.variants.is_empty() {
            CandidateState::RenderFailed
        } else {
            CandidateState::Rendered
        });

        accepted.variants = outcome.variants;
        accepted.render_failures = outcome.failures;
        Processed::Accepted {
            accepted,
            hash_failed,
        }
    }

    fn download_failed(
        &self,
        candidate: &Candidate,
        tracker: &mut Tracker<'_>,
        error: DownloadError,
    ) -> Processed {
        tracker.advance(CandidateState::DownloadFailed);
        self.emit(AcquisitionEvent::DownloadFailed {
            url: candidate.url().to_string(),
            error: error.clone(),
        });
        Processed::DownloadFailed(DownloadFailure {
            url: candidate.url().to_string(),
            provider: candidate.provider_id().to_string(),
            error,
        })
    }
}

/// One-call entry point using environment-configured providers and the
/// file-backed registry and store.
pub async fn acquire_media(
    query: &str,
    per_provider_limit: usize,
    max_concurrent_downloads: usize,
    target_platforms: BTreeMap<String, Size>,
    similarity_threshold: f64,
) -> Result<AcquisitionReport, RunError> {
    let config = AcquisitionConfig {
        per_provider_limit,
        max_concurrent_downloads,
        target_platforms,
        similarity_threshold,
        ..AcquisitionConfig::from_env()
    };

    let providers = ProviderFactory::from_env()?;
    if providers.is_empty() {
        return Err(RunError::Setup(HarvestError::ConfigError(
            "No search providers configured; set at least one provider API key".into(),
        )));
    }

    let acquirer = Acquirer::open(providers, &config).await?;
    let outcome = acquirer.acquire(&Query::new(query), &config).await;
    if let Err(e) = acquirer.registry().flush().await {
        warn!(error = %e, "Failed to flush hash registry");
    }
    outcome
}
