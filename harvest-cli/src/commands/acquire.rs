//! Acquire command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use harvest_core::{
    AcquisitionConfig, AcquisitionReport, Acquirer, HarvestError, Orientation, ProviderFactory,
    Query, Size,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::utils::{print_json, print_report, resolve_platforms};
use crate::OutputFormat;

/// Every configured provider failed its search.
#[derive(Debug, thiserror::Error)]
#[error("All {count} search providers failed")]
pub struct ProvidersUnavailable {
    pub count: usize,
}

#[derive(Args, Debug)]
pub struct AcquireArgs {
    /// Search term
    #[arg(value_name = "QUERY")]
    query: String,

    /// Results requested from each provider
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Downloads in flight at once
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Platform preset to render (repeatable, see `harvest platforms`)
    #[arg(short, long = "platform", value_name = "NAME")]
    platforms: Vec<String>,

    /// Custom platform size (repeatable)
    #[arg(short, long = "size", value_name = "NAME=WxH", value_parser = crate::parse_size_arg)]
    sizes: Vec<(String, Size)>,

    /// Similarity at or above which an image is a duplicate
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Keep candidates whose declared size matches no platform
    #[arg(long)]
    no_size_filter: bool,

    /// Search for the exact phrase
    #[arg(long)]
    exact: bool,

    /// Preferred orientation (landscape, portrait, square)
    #[arg(long, value_parser = crate::parse_orientation)]
    orientation: Option<Orientation>,

    /// Output directory for images and variants
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Hash registry file (defaults to <DIR>/downloaded_hashes.jsonl)
    #[arg(long, value_name = "FILE")]
    registry: Option<PathBuf>,

    /// Stop starting new work after this many seconds
    #[arg(long, value_name = "SECS")]
    deadline: Option<u64>,

    /// Only use these providers (repeatable)
    #[arg(long = "provider", value_name = "NAME")]
    providers: Vec<String>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl AcquireArgs {
    /// Layer command-line flags over the environment configuration.
    fn apply(&self, mut config: AcquisitionConfig) -> Result<AcquisitionConfig> {
        if let Some(limit) = self.limit {
            config.per_provider_limit = limit;
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrent_downloads = concurrency;
        }
        if let Some(threshold) = self.threshold {
            config.similarity_threshold = threshold;
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if self.registry.is_some() {
            config.registry_path = self.registry.clone();
        }
        config.exact_size_filter = !self.no_size_filter;
        config.deadline = self.deadline.map(Duration::from_secs);

        let platforms = resolve_platforms(&self.platforms, &self.sizes)?;
        if !platforms.is_empty() {
            config.target_platforms = platforms;
        }
        Ok(config)
    }

    fn query(&self) -> Query {
        let query = Query::new(self.query.as_str()).exact_phrase(self.exact);
        match self.orientation {
            Some(orientation) => query.orientation(orientation),
            None => query,
        }
    }
}

/// Execute the acquire command.
pub async fn execute(args: AcquireArgs, quiet: bool) -> Result<()> {
    let config = args.apply(AcquisitionConfig::from_env())?;

    let providers = ProviderFactory::select(ProviderFactory::from_env()?, &args.providers)?;
    if providers.is_empty() {
        bail!(HarvestError::ConfigError(
            "No search providers configured; set UNSPLASH_API_KEY, PEXELS_API_KEY, \
             PIXABAY_API_KEY or GOOGLE_API_KEY with GOOGLE_SEARCH_ENGINE_ID"
                .into()
        ));
    }
    let provider_count = providers.len();

    let token = CancellationToken::new();
    let acquirer = Acquirer::open(providers, &config)
        .await
        .with_context(|| format!("Failed to open hash registry at {}", config.registry_path().display()))?
        .with_cancellation(token.clone());

    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight downloads");
            signal_token.cancel();
        }
    });

    if !quiet && args.format == OutputFormat::Text {
        eprintln!(
            "{} \"{}\" across {} provider(s)",
            "Searching".cyan().bold(),
            args.query,
            provider_count
        );
    }

    let outcome = acquirer.acquire(&args.query(), &config).await;
    if let Err(e) = acquirer.registry().flush().await {
        warn!(error = %e, "Failed to flush hash registry on shutdown");
    }

    match outcome {
        Ok(report) => {
            emit(&report, args.format, quiet)?;
            info!(
                accepted = report.accepted.len(),
                output = %config.output_dir.display(),
                "Acquire finished"
            );
            if report.provider_errors.len() == provider_count {
                return Err(ProvidersUnavailable {
                    count: provider_count,
                }
                .into());
            }
            Ok(())
        }
        Err(err) => {
            if let Some(report) = err.report() {
                emit(report, args.format, quiet)?;
            }
            Err(err.into())
        }
    }
}

fn emit(report: &AcquisitionReport, format: OutputFormat, quiet: bool) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Text if !quiet => {
            print_report(report);
            Ok(())
        }
        OutputFormat::Text => Ok(()),
    }
}
