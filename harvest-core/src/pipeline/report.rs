//! Run summary.

use std::time::Duration;

use serde::Serialize;

use super::CandidateState;
use crate::error::{DownloadError, ProviderError};
use crate::hash::PerceptualHash;
use crate::model::{Asset, Variant};
use crate::render::RenderFailure;

/// An asset that passed the duplicate gate and was stored.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedAsset {
    pub asset: Asset,
    /// `None` when hashing failed and the asset was accepted unchecked.
    pub hash: Option<PerceptualHash>,
    pub variants: Vec<Variant>,
    pub render_failures: Vec<RenderFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: ProviderError,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadFailure {
    pub url: String,
    pub provider: String,
    pub error: DownloadError,
}

/// Terminal state of one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateOutcome {
    pub url: String,
    pub provider: String,
    pub state: CandidateState,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AcquisitionReport {
    pub accepted: Vec<AcceptedAsset>,
    pub duplicates_skipped: usize,
    pub provider_errors: Vec<ProviderFailure>,
    pub download_errors: Vec<DownloadFailure>,
    pub candidates_discovered: usize,
    /// Accepted without a duplicate check because hashing failed.
    pub hash_failures: usize,
    /// Platform renders that failed across all accepted assets.
    pub render_errors: usize,
    pub outcomes: Vec<CandidateOutcome>,
    pub cancelled: bool,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub peak_concurrent_downloads: usize,
}

impl AcquisitionReport {
    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.accepted.iter().flat_map(|a| a.variants.iter())
    }

    /// `true` when every provider and every candidate succeeded.
    pub fn is_clean(&self) -> bool {
        self.provider_errors.is_empty() && self.download_errors.is_empty() && self.render_errors == 0
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
