//! Platform variant rendering.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::{HarvestError, Result};
use crate::model::{validate_platform_name, Asset, Size, Variant};
use crate::pool::WorkerPool;
use crate::storage::AssetStore;

/// JPEG quality for rendered variants.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderFailure {
    pub platform: String,
    pub message: String,
}

/// Variants produced for one asset, plus the platforms that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderOutcome {
    pub variants: Vec<Variant>,
    pub failures: Vec<RenderFailure>,
}

impl RenderOutcome {
    fn all_failed(platforms: &BTreeMap<String, Size>, message: &str) -> Self {
        Self {
            variants: Vec::new(),
            failures: platforms
                .keys()
                .map(|platform| RenderFailure {
                    platform: platform.clone(),
                    message: message.to_string(),
                })
                .collect(),
        }
    }
}

/// Produces exact-size JPEG copies of accepted assets.
pub struct VariantRenderer {
    store: Arc<dyn AssetStore>,
    pool: WorkerPool,
    quality: u8,
}

impl VariantRenderer {
    pub fn new(store: Arc<dyn AssetStore>, pool: WorkerPool) -> Self {
        Self {
            store,
            pool,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// Render `asset` for every platform. One platform failing never stops
    /// the others.
    ///
    /// Each variant is scaled to cover the target and center-cropped, then
    /// stored under `<platform>/<asset stem>.jpg`.
    #[instrument(level = "debug", skip_all, fields(asset = %asset.local_path.display(), platforms = platforms.len()))]
    pub async fn render(
        &self,
        asset: &Asset,
        bytes: Arc<Vec<u8>>,
        platforms: &BTreeMap<String, Size>,
    ) -> RenderOutcome {
        if platforms.is_empty() {
            return RenderOutcome::default();
        }

        let decoded = self
            .pool
            .run(move || image::load_from_memory(&bytes).map_err(|e| e.to_string()))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r);
        let image = match decoded {
            Ok(image) => Arc::new(image),
            Err(message) => {
                warn!(error = %message, "Cannot decode asset for rendering");
                return RenderOutcome::all_failed(platforms, &format!("decode failed: {message}"));
            }
        };

        let stem = asset
            .local_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("asset")
            .to_string();

        let jobs = platforms.iter().map(|(platform, size)| {
            let image = Arc::clone(&image);
            let stem = stem.as_str();
            async move {
                let result = self.render_one(asset, image, platform, *size, stem).await;
                (platform.clone(), result)
            }
        });

        let mut outcome = RenderOutcome::default();
        for (platform, result) in join_all(jobs).await {
            match result {
                Ok(variant) => outcome.variants.push(variant),
                Err(e) => {
                    warn!(platform = %platform, error = %e, "Variant render failed");
                    outcome.failures.push(RenderFailure {
                        platform,
                        message: e.to_string(),
                    });
                }
            }
        }

        debug!(
            rendered = outcome.variants.len(),
            failed = outcome.failures.len(),
            "Rendering finished"
        );
        outcome
    }

    async fn render_one(
        &self,
        asset: &Asset,
        image: Arc<DynamicImage>,
        platform: &str,
        size: Size,
        stem: &str,
    ) -> Result<Variant> {
        validate_platform_name(platform)?;

        let quality = self.quality;
        let encoded = self
            .pool
            .run(move || encode_variant(&image, size, quality))
            .await??;

        let key = format!("{platform}/{stem}.jpg");
        let path = self.store.put(&key, &encoded).await?;

        Ok(Variant {
            source: asset.local_path.clone(),
            platform: platform.to_string(),
            size,
            path,
        })
    }
}

/// Cover-resize and center-crop to exactly `size`, encoded as JPEG.
pub fn encode_variant(image: &DynamicImage, size: Size, quality: u8) -> Result<Vec<u8>> {
    let resized = image.resize_to_fill(size.width, size.height, FilterType::Lanczos3);
    let rgb = resized.to_rgb8();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(|e| HarvestError::StorageError(format!("JPEG encoding failed: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Candidate, ProviderResult};
    use crate::storage::MemoryAssetStore;
    use image::{GenericImageView, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::path::PathBuf;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn asset() -> Asset {
        Asset {
            candidate: Candidate {
                result: ProviderResult::new("mock", "https://x/1.png"),
                platform: None,
            },
            content_type: "image/png".into(),
            byte_size: 0,
            local_path: PathBuf::from("originals/abcd.png"),
        }
    }

    #[test]
    fn test_encode_variant_exact_size() {
        let image = image::load_from_memory(&png_bytes(300, 200)).unwrap();
        let jpeg = encode_variant(&image, Size::new(120, 120), 85).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (120, 120));
    }

    #[tokio::test]
    async fn test_render_all_platforms() {
        let store = Arc::new(MemoryAssetStore::new());
        let renderer = VariantRenderer::new(store.clone(), WorkerPool::new(2).unwrap());
        let platforms = BTreeMap::from([
            ("wide".to_string(), Size::new(160, 90)),
            ("tall".to_string(), Size::new(90, 160)),
        ]);

        let outcome = renderer
            .render(&asset(), Arc::new(png_bytes(200, 200)), &platforms)
            .await;

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.variants.len(), 2);
        assert_eq!(store.keys(), vec!["tall/abcd.jpg", "wide/abcd.jpg"]);

        let wide = image::load_from_memory(&store.get("wide/abcd.jpg").unwrap()).unwrap();
        assert_eq!(wide.dimensions(), (160, 90));
    }

    #[tokio::test]
    async fn test_render_bad_platform_name_is_isolated() {
        let store = Arc::new(MemoryAssetStore::new());
        let renderer = VariantRenderer::new(store.clone(), WorkerPool::new(1).unwrap());
        let platforms = BTreeMap::from([
            ("ok".to_string(), Size::new(50, 50)),
            ("../bad".to_string(), Size::new(50, 50)),
        ]);

        let outcome = renderer
            .render(&asset(), Arc::new(png_bytes(64, 64)), &platforms)
            .await;

        assert_eq!(outcome.variants.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].platform, "../bad");
    }

    #[tokio::test]
    async fn test_render_undecodable_fails_every_platform() {
        let renderer = VariantRenderer::new(Arc::new(MemoryAssetStore::new()), WorkerPool::new(1).unwrap());
        let platforms = BTreeMap::from([("a".to_string(), Size::new(10, 10))]);

        let outcome = renderer
            .render(&asset(), Arc::new(b"garbage".to_vec()), &platforms)
            .await;

        assert!(outcome.variants.is_empty());
        assert_eq!(outcome.failures.len(), 1);
    }
}
