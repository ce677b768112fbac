//! End-to-end acquisition runs against mocked provider APIs and image hosts.

mod common;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use harvest_core::provider::{PexelsConfig, PexelsProvider, UnsplashConfig, UnsplashProvider};
use harvest_core::{
    AcquisitionConfig, AcquisitionEvent, Acquirer, CandidateState, FileHashLog, FsAssetStore,
    HashRegistry, MemoryAssetStore, MemoryHashLog, MockProvider, ProviderError, Query, RunError,
    SearchProvider, Size,
};
use async_trait::async_trait;
use harvest_core::{AssetStore, HarvestError};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{fast_download_config, png, png_sized, Pattern, HEIGHT, WIDTH};

async fn serve_image(server: &MockServer, route: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(bytes, "image/png"))
        .mount(server)
        .await;
}

fn photo(server: &MockServer, route: &str, width: u32, height: u32) -> serde_json::Value {
    json!({
        "src": { "original": format!("{}{route}", server.uri()) },
        "width": width,
        "height": height
    })
}

/// Pexels and Unsplash on one mock server:
///
/// - pexels: 1 (vertical), 2 (horizontal), 3 (checkerboard), 6 (wrong size)
/// - unsplash: 1 again, 4 (diagonal), 5 (near copy of 1)
async fn landscape_server() -> MockServer {
    let server = MockServer::start().await;

    serve_image(&server, "/img/1.png", png(Pattern::VerticalSplit)).await;
    serve_image(&server, "/img/2.png", png(Pattern::HorizontalSplit)).await;
    serve_image(&server, "/img/3.png", png(Pattern::Checkerboard)).await;
    serve_image(&server, "/img/4.png", png(Pattern::Diagonal)).await;
    serve_image(&server, "/img/5.png", png(Pattern::VerticalSplitTouched)).await;
    serve_image(
        &server,
        "/img/6.png",
        png_sized(Pattern::Diagonal, WIDTH, HEIGHT + 1),
    )
    .await;

    let pexels_body = json!({
        "photos": [
            photo(&server, "/img/1.png", WIDTH, HEIGHT),
            photo(&server, "/img/2.png", WIDTH, HEIGHT),
            photo(&server, "/img/3.png", WIDTH, HEIGHT),
            photo(&server, "/img/6.png", WIDTH, HEIGHT + 1),
        ]
    });
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(header("Authorization", "pexels-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pexels_body))
        .mount(&server)
        .await;

    let unsplash_item = |route: &str| {
        json!({
            "urls": { "raw": format!("{}{route}", server.uri()) },
            "width": WIDTH,
            "height": HEIGHT
        })
    };
    let unsplash_body = json!({
        "results": [
            unsplash_item("/img/1.png"),
            unsplash_item("/img/4.png"),
            unsplash_item("/img/5.png"),
        ]
    });
    Mock::given(method("GET"))
        .and(path("/search/photos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(unsplash_body))
        .mount(&server)
        .await;

    server
}

fn landscape_providers(server: &MockServer) -> Vec<Arc<dyn SearchProvider>> {
    let pexels = PexelsProvider::new(
        PexelsConfig::new("pexels-key").with_api_url(format!("{}/v1", server.uri())),
    )
    .unwrap();
    let unsplash =
        UnsplashProvider::new(UnsplashConfig::new("unsplash-key").with_api_url(server.uri()))
            .unwrap();
    vec![Arc::new(pexels), Arc::new(unsplash)]
}

fn thumb_config(dir: &Path) -> AcquisitionConfig {
    AcquisitionConfig {
        cpu_workers: 2,
        download: fast_download_config(dir),
        ..AcquisitionConfig::default()
    }
    .with_output_dir(dir.join("out"))
    .with_platform("thumb", Size::new(WIDTH, HEIGHT))
}

async fn file_acquirer(server: &MockServer, config: &AcquisitionConfig) -> Acquirer {
    let registry = HashRegistry::open(FileHashLog::new(config.registry_path()))
        .await
        .unwrap();
    Acquirer::new(
        landscape_providers(server),
        Arc::new(registry),
        Arc::new(FsAssetStore::new(&config.output_dir)),
    )
}

#[tokio::test]
async fn test_landscape_run_dedups_and_renders() {
    let server = landscape_server().await;
    let dir = TempDir::new().unwrap();
    let config = thumb_config(dir.path());
    let acquirer = file_acquirer(&server, &config).await;

    let report = acquirer
        .acquire(&Query::new("landscape"), &config)
        .await
        .expect("run should succeed");

    assert!(report.provider_errors.is_empty(), "{:?}", report.provider_errors);
    assert!(report.download_errors.is_empty(), "{:?}", report.download_errors);
    assert_eq!(report.candidates_discovered, 5);
    assert_eq!(report.duplicates_skipped, 1);
    assert_eq!(report.accepted.len(), 4);
    assert_eq!(report.hash_failures, 0);

    // Exactly one of the near-identical pair survives.
    let urls: HashSet<String> = report
        .accepted
        .iter()
        .map(|a| a.asset.candidate.url().to_string())
        .collect();
    let original = format!("{}/img/1.png", server.uri());
    let touched = format!("{}/img/5.png", server.uri());
    assert!(urls.contains(&original) ^ urls.contains(&touched));
    assert!(!urls.contains(&format!("{}/img/6.png", server.uri())));

    // Accepted hashes are pairwise below the threshold.
    let hashes: Vec<_> = report
        .accepted
        .iter()
        .map(|a| a.hash.clone().expect("hash computed"))
        .collect();
    for (i, a) in hashes.iter().enumerate() {
        for b in &hashes[i + 1..] {
            assert!(a.similarity(b) < config.similarity_threshold);
        }
    }

    // One exact-size variant per accepted asset, written to disk.
    let variants: Vec<_> = report.variants().collect();
    assert_eq!(variants.len(), 4);
    for variant in variants {
        assert_eq!(variant.platform, "thumb");
        assert_eq!(variant.size, Size::new(WIDTH, HEIGHT));
        let rendered = image::open(&variant.path).expect("variant readable");
        assert_eq!((rendered.width(), rendered.height()), (WIDTH, HEIGHT));
    }
    for accepted in &report.accepted {
        assert!(accepted.asset.local_path.exists());
    }

    assert_eq!(acquirer.registry().len().await, 4);
    assert!(report.peak_concurrent_downloads <= config.max_concurrent_downloads);
    assert!(report
        .outcomes
        .iter()
        .all(|o| matches!(o.state, CandidateState::Rendered | CandidateState::Duplicate)));
}

#[tokio::test]
async fn test_second_run_finds_only_duplicates() {
    let server = landscape_server().await;
    let dir = TempDir::new().unwrap();
    let config = thumb_config(dir.path());

    let first = file_acquirer(&server, &config)
        .await
        .acquire(&Query::new("landscape"), &config)
        .await
        .unwrap();
    assert_eq!(first.accepted.len(), 4);

    // Fresh registry loaded from the same log file.
    let second = file_acquirer(&server, &config)
        .await
        .acquire(&Query::new("landscape"), &config)
        .await
        .unwrap();

    assert!(second.accepted.is_empty());
    assert_eq!(second.duplicates_skipped, 5);
    assert_eq!(second.candidates_discovered, 5);

    let log = std::fs::read_to_string(config.registry_path()).unwrap();
    assert_eq!(log.lines().count(), 4);
}

#[tokio::test]
async fn test_download_concurrency_stays_within_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(png(Pattern::Checkerboard), "image/png")
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let urls: Vec<String> = (0..12)
        .map(|i| format!("{}/slow/{i}.png", server.uri()))
        .collect();
    let provider = MockProvider::with_urls("mock", urls.iter().map(|u| (u.as_str(), WIDTH, HEIGHT)));

    let dir = TempDir::new().unwrap();
    let config = AcquisitionConfig {
        per_provider_limit: 20,
        max_concurrent_downloads: 3,
        cpu_workers: 2,
        download: fast_download_config(dir.path()),
        ..AcquisitionConfig::default()
    };
    let acquirer = Acquirer::new(
        vec![Arc::new(provider)],
        Arc::new(HashRegistry::in_memory()),
        Arc::new(MemoryAssetStore::new()),
    );

    let report = acquirer.acquire(&Query::new("slow"), &config).await.unwrap();

    assert_eq!(report.candidates_discovered, 12);
    // Same picture twelve times: one accepted, the rest duplicates.
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.duplicates_skipped, 11);
    assert!(report.peak_concurrent_downloads >= 1);
    assert!(
        report.peak_concurrent_downloads <= 3,
        "peak was {}",
        report.peak_concurrent_downloads
    );
}

#[tokio::test]
async fn test_failing_provider_reported_once() {
    let server = MockServer::start().await;
    serve_image(&server, "/ok.png", png(Pattern::Diagonal)).await;
    let ok_url = format!("{}/ok.png", server.uri());

    let dir = TempDir::new().unwrap();
    let acquirer = Acquirer::new(
        vec![
            Arc::new(MockProvider::failing(
                "broken",
                ProviderError::unavailable("HTTP 401"),
            )),
            Arc::new(MockProvider::with_urls("working", [(ok_url.as_str(), WIDTH, HEIGHT)])),
        ],
        Arc::new(HashRegistry::in_memory()),
        Arc::new(MemoryAssetStore::new()),
    );
    let config = AcquisitionConfig {
        download: fast_download_config(dir.path()),
        ..AcquisitionConfig::default()
    };

    let report = acquirer.acquire(&Query::new("x"), &config).await.unwrap();

    assert_eq!(report.provider_errors.len(), 1);
    assert_eq!(report.provider_errors[0].provider, "broken");
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.accepted[0].asset.candidate.provider_id(), "working");
}

#[tokio::test]
async fn test_undecodable_image_is_accepted_unchecked() {
    let server = MockServer::start().await;
    serve_image(&server, "/broken.png", b"definitely not a png".to_vec()).await;
    let url = format!("{}/broken.png", server.uri());

    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryAssetStore::new());
    let registry = Arc::new(HashRegistry::in_memory());
    let acquirer = Acquirer::new(
        vec![Arc::new(MockProvider::with_urls("mock", [(url.as_str(), 1, 1)]))],
        Arc::clone(&registry),
        store.clone(),
    );
    let config = AcquisitionConfig {
        download: fast_download_config(dir.path()),
        ..AcquisitionConfig::default()
    };

    let report = acquirer.acquire(&Query::new("x"), &config).await.unwrap();

    assert_eq!(report.accepted.len(), 1);
    assert!(report.accepted[0].hash.is_none());
    assert_eq!(report.hash_failures, 1);
    assert!(registry.is_empty().await);
    assert_eq!(store.keys().len(), 1);
}

#[tokio::test]
async fn test_registry_failure_stops_run_with_report() {
    let server = MockServer::start().await;
    serve_image(&server, "/a.png", png(Pattern::VerticalSplit)).await;
    let url = format!("{}/a.png", server.uri());

    let dir = TempDir::new().unwrap();
    let registry = HashRegistry::open(MemoryHashLog::failing()).await.unwrap();
    let acquirer = Acquirer::new(
        vec![Arc::new(MockProvider::with_urls("mock", [(url.as_str(), WIDTH, HEIGHT)]))],
        Arc::new(registry),
        Arc::new(MemoryAssetStore::new()),
    );
    let config = AcquisitionConfig {
        download: fast_download_config(dir.path()),
        ..AcquisitionConfig::default()
    };

    let err = acquirer.acquire(&Query::new("x"), &config).await.unwrap_err();

    match err {
        RunError::Registry { report, .. } => {
            assert!(report.accepted.is_empty());
            assert_eq!(report.candidates_discovered, 1);
        }
        other => panic!("expected registry failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limited_provider_is_retried_once() {
    let server = MockServer::start().await;
    serve_image(&server, "/r.png", png(Pattern::HorizontalSplit)).await;
    let url = format!("{}/r.png", server.uri());

    let provider = Arc::new(MockProvider::rate_limited_once(
        "slowpoke",
        Duration::from_millis(50),
        vec![harvest_core::ProviderResult::new("slowpoke", url).with_size(WIDTH, HEIGHT)],
    ));
    let dir = TempDir::new().unwrap();
    let acquirer = Acquirer::new(
        vec![provider.clone()],
        Arc::new(HashRegistry::in_memory()),
        Arc::new(MemoryAssetStore::new()),
    );
    let config = AcquisitionConfig {
        download: fast_download_config(dir.path()),
        ..AcquisitionConfig::default()
    };

    let report = acquirer.acquire(&Query::new("x"), &config).await.unwrap();

    assert_eq!(provider.calls(), 2);
    assert!(report.provider_errors.is_empty());
    assert_eq!(report.accepted.len(), 1);
}

#[tokio::test]
async fn test_events_follow_candidate_lifecycle() {
    let server = MockServer::start().await;
    serve_image(&server, "/e.png", png(Pattern::Checkerboard)).await;
    let url = format!("{}/e.png", server.uri());

    let dir = TempDir::new().unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let acquirer = Acquirer::new(
        vec![Arc::new(MockProvider::with_urls("mock", [(url.as_str(), WIDTH, HEIGHT)]))],
        Arc::new(HashRegistry::in_memory()),
        Arc::new(MemoryAssetStore::new()),
    )
    .with_events(tx);
    let config = AcquisitionConfig {
        download: fast_download_config(dir.path()),
        ..AcquisitionConfig::default()
    }
    .with_platform("thumb", Size::new(80, 80));
    let query = Query::new("x").with_platform("thumb", Size::new(WIDTH, HEIGHT));

    let report = acquirer.acquire(&query, &config).await.unwrap();
    drop(acquirer);

    // Query platforms replace the configured ones.
    assert_eq!(report.variants().next().map(|v| v.size), Some(Size::new(WIDTH, HEIGHT)));

    let mut states = Vec::new();
    while let Some(event) = rx.recv().await {
        if let AcquisitionEvent::StateChanged { state, .. } = event {
            states.push(state);
        }
    }
    assert_eq!(
        states,
        vec![
            CandidateState::Downloading,
            CandidateState::Downloaded,
            CandidateState::HashChecked,
            CandidateState::Accepted,
            CandidateState::Rendering,
            CandidateState::Rendered,
        ]
    );
}

#[tokio::test]
async fn test_deadline_cancels_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(png(Pattern::Diagonal), "image/png")
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;
    let urls: Vec<String> = (0..6)
        .map(|i| format!("{}/late/{i}.png", server.uri()))
        .collect();

    let dir = TempDir::new().unwrap();
    let acquirer = Acquirer::new(
        vec![Arc::new(MockProvider::with_urls(
            "mock",
            urls.iter().map(|u| (u.as_str(), WIDTH, HEIGHT)),
        ))],
        Arc::new(HashRegistry::in_memory()),
        Arc::new(MemoryAssetStore::new()),
    );
    let config = AcquisitionConfig {
        max_concurrent_downloads: 1,
        deadline: Some(Duration::from_millis(100)),
        download: fast_download_config(dir.path()),
        ..AcquisitionConfig::default()
    };

    let err = acquirer.acquire(&Query::new("x"), &config).await.unwrap_err();
    let report = err.into_report().expect("partial report");

    assert!(report.cancelled);
    // The attempt in flight when the deadline hit is allowed to finish.
    assert!(report.accepted.len() <= 1);
    assert!(report.outcomes.len() < 6);
}

/// Memory store that refuses writes under the given platform directories.
struct RejectingStore {
    inner: MemoryAssetStore,
    rejected: Vec<&'static str>,
}

impl RejectingStore {
    fn new(rejected: Vec<&'static str>) -> Self {
        Self {
            inner: MemoryAssetStore::new(),
            rejected,
        }
    }
}

#[async_trait]
impl AssetStore for RejectingStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> harvest_core::Result<PathBuf> {
        if self
            .rejected
            .iter()
            .any(|platform| key.starts_with(&format!("{platform}/")))
        {
            return Err(HarvestError::StorageError(format!("write refused for {key}")));
        }
        self.inner.put(key, bytes).await
    }

    async fn exists(&self, key: &str) -> harvest_core::Result<bool> {
        self.inner.exists(key).await
    }

    fn locate(&self, key: &str) -> harvest_core::Result<PathBuf> {
        self.inner.locate(key)
    }
}

async fn render_run(rejected: Vec<&'static str>) -> harvest_core::AcquisitionReport {
    let server = MockServer::start().await;
    serve_image(&server, "/wide.png", png(Pattern::HorizontalSplit)).await;
    let url = format!("{}/wide.png", server.uri());

    let dir = TempDir::new().unwrap();
    let acquirer = Acquirer::new(
        vec![Arc::new(MockProvider::with_urls("mock", [(url.as_str(), WIDTH, HEIGHT)]))],
        Arc::new(HashRegistry::in_memory()),
        Arc::new(RejectingStore::new(rejected)),
    );
    let config = AcquisitionConfig {
        cpu_workers: 2,
        exact_size_filter: false,
        download: fast_download_config(dir.path()),
        ..AcquisitionConfig::default()
    }
    .with_platform("thumb", Size::new(WIDTH, HEIGHT))
    .with_platform("banner", Size::new(320, 100));

    acquirer.acquire(&Query::new("wide"), &config).await.unwrap()
}

#[tokio::test]
async fn test_partial_render_still_counts_as_rendered() {
    let report = render_run(vec!["banner"]).await;

    assert_eq!(report.accepted.len(), 1);
    let accepted = &report.accepted[0];
    assert_eq!(accepted.variants.len(), 1);
    assert_eq!(accepted.variants[0].platform, "thumb");
    assert_eq!(accepted.render_failures.len(), 1);
    assert_eq!(accepted.render_failures[0].platform, "banner");
    assert_eq!(report.render_errors, 1);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].state, CandidateState::Rendered);
}

#[tokio::test]
async fn test_all_renders_failing_keeps_asset_accepted() {
    let report = render_run(vec!["thumb", "banner"]).await;

    assert_eq!(report.accepted.len(), 1);
    assert!(report.accepted[0].variants.is_empty());
    assert_eq!(report.render_errors, 2);
    assert!(report.download_errors.is_empty());
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].state, CandidateState::RenderFailed);
}
