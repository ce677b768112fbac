//! Incremental progress events.

use serde::Serialize;

use super::CandidateState;
use crate::error::{DownloadError, ProviderError};
use crate::model::Variant;

/// Emitted while a run progresses, for callers that stream progress.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AcquisitionEvent {
    ProviderSearched {
        provider: String,
        results: usize,
    },
    ProviderFailed {
        provider: String,
        error: ProviderError,
    },
    CandidatesAggregated {
        candidates: usize,
        url_duplicates: usize,
        size_rejected: usize,
    },
    StateChanged {
        url: String,
        state: CandidateState,
    },
    DownloadFailed {
        url: String,
        error: DownloadError,
    },
    /// A hash was registered for a newly accepted asset.
    HashRegistered {
        url: String,
        hash: String,
    },
    DuplicateSkipped {
        url: String,
        similarity: f64,
    },
    VariantRendered {
        url: String,
        variant: Variant,
    },
    Cancelled,
}
