//! Candidate aggregation: merge, URL de-duplication and exact-size filtering.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::model::{Candidate, ProviderResult, Size};

/// Counters describing what aggregation discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    /// Results received across all providers.
    pub merged: usize,
    /// Results dropped because an earlier result had the same URL.
    pub url_duplicates: usize,
    /// Results dropped by the target-size filter.
    pub size_rejected: usize,
}

/// Merge per-provider result lists into URL-unique candidates.
///
/// Provider order is the tie-break: the first occurrence of a URL wins. When
/// `target_sizes` is non-empty, only results whose declared dimensions equal
/// one of the sizes survive, tagged with that platform name (first name in
/// order when several platforms share a size).
pub fn aggregate(
    all_results: Vec<Vec<ProviderResult>>,
    target_sizes: &BTreeMap<String, Size>,
) -> Vec<Candidate> {
    aggregate_with_stats(all_results, target_sizes).0
}

pub fn aggregate_with_stats(
    all_results: Vec<Vec<ProviderResult>>,
    target_sizes: &BTreeMap<String, Size>,
) -> (Vec<Candidate>, AggregateStats) {
    let mut stats = AggregateStats::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();

    for result in all_results.into_iter().flatten() {
        stats.merged += 1;

        if !seen.insert(result.url.clone()) {
            stats.url_duplicates += 1;
            continue;
        }

        if target_sizes.is_empty() {
            candidates.push(Candidate {
                result,
                platform: None,
            });
            continue;
        }

        let platform = result.declared_size().and_then(|declared| {
            target_sizes
                .iter()
                .find(|(_, size)| **size == declared)
                .map(|(name, _)| name.clone())
        });

        match platform {
            Some(platform) => candidates.push(Candidate {
                result,
                platform: Some(platform),
            }),
            None => stats.size_rejected += 1,
        }
    }

    debug!(
        merged = stats.merged,
        url_duplicates = stats.url_duplicates,
        size_rejected = stats.size_rejected,
        candidates = candidates.len(),
        "Aggregated provider results"
    );

    (candidates, stats)
}
