//! Scripted provider for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::SearchProvider;
use crate::error::ProviderError;
use crate::model::{ProviderResult, Query};

#[derive(Debug, Clone)]
enum Behavior {
    Results(Vec<ProviderResult>),
    Fail(ProviderError),
    RateLimitedOnce {
        retry_after: Duration,
        results: Vec<ProviderResult>,
    },
}

/// Mock search provider returning canned results.
///
/// WARNING: for tests and offline runs only; it never touches the network.
#[derive(Debug)]
pub struct MockProvider {
    id: String,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Always return `results`, tagged with this provider's id.
    pub fn new(id: impl Into<String>, results: Vec<ProviderResult>) -> Self {
        Self::with_behavior(id, Behavior::Results(results))
    }

    /// Build results from `(url, width, height)` triples.
    pub fn with_urls<'a>(
        id: impl Into<String>,
        urls: impl IntoIterator<Item = (&'a str, u32, u32)>,
    ) -> Self {
        let id = id.into();
        let results = urls
            .into_iter()
            .map(|(url, w, h)| ProviderResult::new(id.clone(), url).with_size(w, h))
            .collect();
        Self::new(id, results)
    }

    /// Always fail with `error`.
    pub fn failing(id: impl Into<String>, error: ProviderError) -> Self {
        Self::with_behavior(id, Behavior::Fail(error))
    }

    /// Rate-limit the first call, then return `results`.
    pub fn rate_limited_once(
        id: impl Into<String>,
        retry_after: Duration,
        results: Vec<ProviderResult>,
    ) -> Self {
        Self::with_behavior(
            id,
            Behavior::RateLimitedOnce {
                retry_after,
                results,
            },
        )
    }

    fn with_behavior(id: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            id: id.into(),
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `search` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tagged(&self, results: &[ProviderResult], max_results: usize) -> Vec<ProviderResult> {
        results
            .iter()
            .take(max_results)
            .cloned()
            .map(|mut r| {
                r.provider_id = self.id.clone();
                r
            })
            .collect()
    }
}

#[async_trait]
impl SearchProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn search(
        &self,
        _query: &Query,
        max_results: usize,
    ) -> Result<Vec<ProviderResult>, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Results(results) => Ok(self.tagged(results, max_results)),
            Behavior::Fail(error) => Err(error.clone()),
            Behavior::RateLimitedOnce {
                retry_after,
                results,
            } => {
                if call == 0 {
                    Err(ProviderError::RateLimited {
                        retry_after: *retry_after,
                    })
                } else {
                    Ok(self.tagged(results, max_results))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_respects_cap_and_tags() {
        let mock = MockProvider::with_urls("m", [("https://x/1", 10, 10), ("https://x/2", 10, 10)]);
        let results = mock.search(&Query::new("q"), 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].provider_id, "m");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_rate_limited_once() {
        let mock = MockProvider::rate_limited_once(
            "m",
            Duration::from_secs(1),
            vec![ProviderResult::new("m", "https://x/1")],
        );
        let first = mock.search(&Query::new("q"), 5).await;
        assert!(matches!(first, Err(ProviderError::RateLimited { .. })));
        let second = mock.search(&Query::new("q"), 5).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let mock = MockProvider::failing("m", ProviderError::unavailable("down"));
        assert!(mock.search(&Query::new("q"), 5).await.is_err());
    }
}
