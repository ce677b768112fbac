//! End-to-end acquire runs of the harvest binary against a mocked Pexels API.

use std::io::Cursor;

use assert_cmd::Command;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROVIDER_ENV: &[&str] = &[
    "UNSPLASH_API_KEY",
    "PEXELS_API_KEY",
    "PIXABAY_API_KEY",
    "GOOGLE_API_KEY",
    "GOOGLE_SEARCH_ENGINE_ID",
];

fn harvest_with_pexels(server: &MockServer) -> Command {
    let mut cmd = Command::cargo_bin("harvest").unwrap();
    for var in PROVIDER_ENV {
        cmd.env_remove(var);
    }
    cmd.env_remove("HARVEST_REGISTRY_PATH")
        .env("PEXELS_API_KEY", "test-key")
        .env("PEXELS_API_URL", server.uri())
        .env("HARVEST_CPU_WORKERS", "2");
    cmd
}

fn png(horizontal: bool) -> Vec<u8> {
    let img = RgbImage::from_fn(160, 90, |x, y| {
        let light = if horizontal { y >= 45 } else { x >= 80 };
        if light {
            Rgb([230, 220, 210])
        } else {
            Rgb([20, 30, 40])
        }
    });
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

async fn pexels_server() -> MockServer {
    let server = MockServer::start().await;
    for (route, horizontal) in [("/img/v.png", false), ("/img/h.png", true)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(png(horizontal), "image/png"))
            .mount(&server)
            .await;
    }
    let photo = |route: &str| {
        json!({ "src": { "original": format!("{}{route}", server.uri()) }, "width": 160, "height": 90 })
    };
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "photos": [photo("/img/v.png"), photo("/img/h.png")]
        })))
        .mount(&server)
        .await;
    server
}

fn run_json(cmd: &mut Command) -> (Option<i32>, Value) {
    let output = cmd.output().unwrap();
    let report = serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}); stderr:\n{}",
            String::from_utf8_lossy(&output.stderr)
        )
    });
    (output.status.code(), report)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_acquire_then_rerun_skips_duplicates() {
    let server = pexels_server().await;
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("images");

    let acquire = |server: &MockServer| {
        let mut cmd = harvest_with_pexels(server);
        cmd.args(["acquire", "landscape", "--size", "thumb=160x90", "--format", "json", "--output"])
            .arg(&out);
        cmd
    };

    let (code, first) = run_json(&mut acquire(&server));
    assert_eq!(code, Some(0));
    assert_eq!(first["candidates_discovered"], 2);
    assert_eq!(first["accepted"].as_array().unwrap().len(), 2);
    assert_eq!(first["duplicates_skipped"], 0);

    for accepted in first["accepted"].as_array().unwrap() {
        let variant = &accepted["variants"][0];
        assert_eq!(variant["platform"], "thumb");
        assert!(std::path::Path::new(variant["path"].as_str().unwrap()).exists());
    }
    assert!(out.join("downloaded_hashes.jsonl").exists());

    let (code, second) = run_json(&mut acquire(&server));
    assert_eq!(code, Some(0));
    assert!(second["accepted"].as_array().unwrap().is_empty());
    assert_eq!(second["duplicates_skipped"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unavailable_provider_exit_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (code, report) = run_json(
        harvest_with_pexels(&server)
            .args(["acquire", "cats", "--format", "json", "--output"])
            .arg(dir.path()),
    );

    assert_eq!(code, Some(69));
    assert_eq!(report["provider_errors"][0]["provider"], "pexels");
    assert_eq!(report["provider_errors"][0]["error"]["kind"], "unavailable");
}
