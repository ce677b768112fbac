//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use harvest_core::DownloadConfig;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

pub const WIDTH: u32 = 160;
pub const HEIGHT: u32 = 90;

const DARK: Rgb<u8> = Rgb([20, 30, 40]);
const LIGHT: Rgb<u8> = Rgb([230, 220, 210]);

/// Two-tone test patterns with clearly different perceptual hashes.
#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    /// Dark left half, light right half.
    VerticalSplit,
    /// Dark top half, light bottom half.
    HorizontalSplit,
    /// 20px checkerboard.
    Checkerboard,
    /// Light above the main diagonal.
    Diagonal,
    /// `VerticalSplit` with a small patch flipped.
    VerticalSplitTouched,
}

pub fn pattern_image(pattern: Pattern, width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let light = match pattern {
            Pattern::VerticalSplit => x >= width / 2,
            Pattern::HorizontalSplit => y >= height / 2,
            Pattern::Checkerboard => (x / 20 + y / 20) % 2 == 0,
            Pattern::Diagonal => u64::from(x) * u64::from(height) > u64::from(y) * u64::from(width),
            Pattern::VerticalSplitTouched => {
                let patch = x < 4 && y < 4;
                (x >= width / 2) ^ patch
            }
        };
        if light {
            LIGHT
        } else {
            DARK
        }
    })
}

/// PNG bytes for `pattern` at the default test size.
pub fn png(pattern: Pattern) -> Vec<u8> {
    png_sized(pattern, WIDTH, HEIGHT)
}

pub fn png_sized(pattern: Pattern, width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(pattern_image(pattern, width, height))
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("PNG encoding failed");
    buffer.into_inner()
}

/// Downloader settings with short backoff, staging under `dir`.
pub fn fast_download_config(dir: &Path) -> DownloadConfig {
    DownloadConfig {
        timeout: Duration::from_secs(5),
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        staging_dir: dir.join("staging"),
        ..Default::default()
    }
}
