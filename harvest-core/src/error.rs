use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::AcquisitionReport;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Perceptual hash error: {0}")]
    PerceptualHashError(String),

    #[error("Registry persistence failed: {0}")]
    RegistryPersistenceFailed(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Worker pool error: {0}")]
    WorkerPoolError(String),
}

pub type Result<T> = std::result::Result<T, HarvestError>;

/// Failure of a whole provider search call.
///
/// These never abort a run: the orchestrator records one failure per provider
/// and carries on with the others.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderError {
    /// Connection or authentication failure for the whole provider.
    #[error("Provider unavailable: {reason}")]
    Unavailable { reason: String },

    /// The provider asked us to slow down.
    #[error("Rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// The response did not have the shape the adapter expects.
    #[error("Invalid response format: {reason}")]
    InvalidResponseFormat { reason: String },
}

impl ProviderError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidResponseFormat {
            reason: reason.into(),
        }
    }
}

/// Terminal failure of a single candidate download.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadError {
    #[error("Transient failure persisted after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    #[error("Permanent failure: {message}")]
    Permanent { message: String },

    #[error("Non-image content type: {content_type}")]
    NonImageContent { content_type: String },

    #[error("Rate limit recurred after the permitted retry")]
    RateLimited,

    #[error("Asset exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("Storage error: {message}")]
    Storage { message: String },

    /// The run was cancelled before this download could finish.
    #[error("Cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

/// Run-level failure of an acquisition.
///
/// Both variants carry the partial report gathered up to the point the run
/// stopped.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Acquisition cancelled")]
    Cancelled { report: Box<AcquisitionReport> },

    #[error("Registry persistence failed: {message}")]
    Registry {
        message: String,
        report: Box<AcquisitionReport>,
    },

    #[error("Acquisition setup failed: {0}")]
    Setup(#[from] HarvestError),
}

impl RunError {
    /// The partial report, if the run got far enough to produce one.
    pub fn report(&self) -> Option<&AcquisitionReport> {
        match self {
            Self::Cancelled { report } | Self::Registry { report, .. } => Some(report),
            Self::Setup(_) => None,
        }
    }

    pub fn into_report(self) -> Option<AcquisitionReport> {
        match self {
            Self::Cancelled { report } | Self::Registry { report, .. } => Some(*report),
            Self::Setup(_) => None,
        }
    }
}
