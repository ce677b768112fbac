//! Perceptual fingerprints for near-duplicate detection.
//!
//! # Components
//!
//! - **Mean32**: the default luminance threshold hash (1024 bits). Cheap and
//!   approximate: it catches re-encodes, light crops and resizes of the same
//!   picture, not semantically similar images.
//! - **Blockhash64**: a 64-bit grid hash, available with the `blockhash`
//!   feature for callers that want a more compact fingerprint.
//!
//! Hashes from different algorithms never compare as similar.

pub mod perceptual;

pub use perceptual::*;
