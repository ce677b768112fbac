//! Per-candidate lifecycle.

use serde::Serialize;

/// Where a candidate is in the pipeline.
///
/// ```text
/// Discovered -> Downloading -> DownloadFailed
///                           -> Downloaded -> HashChecked -> Duplicate
///                                                        -> Accepted -> Rendering -> Rendered
///                                                                                -> RenderFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    Discovered,
    Downloading,
    DownloadFailed,
    Downloaded,
    HashChecked,
    Duplicate,
    Accepted,
    Rendering,
    Rendered,
    RenderFailed,
}

impl CandidateState {
    /// Move to `next`, or `None` if the transition is not allowed.
    pub fn advance(self, next: CandidateState) -> Option<CandidateState> {
        use CandidateState::*;

        let allowed = matches!(
            (self, next),
            (Discovered, Downloading)
                | (Downloading, DownloadFailed)
                | (Downloading, Downloaded)
                | (Downloaded, HashChecked)
                // Storage failures once the body has arrived.
                | (Downloaded, DownloadFailed)
                | (HashChecked, DownloadFailed)
                | (HashChecked, Duplicate)
                | (HashChecked, Accepted)
                | (Accepted, Rendering)
                | (Rendering, Rendered)
                | (Rendering, RenderFailed)
        );
        allowed.then_some(next)
    }

    /// States a candidate can end in. `Accepted` is terminal only when no
    /// platforms are configured.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::DownloadFailed | Self::Duplicate | Self::Accepted | Self::Rendered | Self::RenderFailed
        )
    }
}

impl std::fmt::Display for CandidateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Discovered => "discovered",
            Self::Downloading => "downloading",
            Self::DownloadFailed => "download_failed",
            Self::Downloaded => "downloaded",
            Self::HashChecked => "hash_checked",
            Self::Duplicate => "duplicate",
            Self::Accepted => "accepted",
            Self::Rendering => "rendering",
            Self::Rendered => "rendered",
            Self::RenderFailed => "render_failed",
        };
        f.write_str(name)
    }
}
