//! Perceptual hashing for images.
//!
//! # Algorithm
//!
//! `Mean32` converts the image to single-channel luminance, resizes it to a
//! 32×32 grid with a Lanczos3 filter and sets one bit per cell: 1 when the
//! cell is strictly brighter than the grid mean. Bits are emitted in row-major
//! order and packed MSB-first, giving a 128-byte (1024-bit) hash.
//!
//! # Usage
//!
//! ```no_run
//! use harvest_core::hash::{HashAlgorithm, PerceptualHasher};
//!
//! let a = std::fs::read("a.jpg").unwrap();
//! let b = std::fs::read("b.jpg").unwrap();
//! let hasher = PerceptualHasher::new(HashAlgorithm::Mean32);
//! let ha = hasher.hash_bytes(&a).unwrap();
//! let hb = hasher.hash_bytes(&b).unwrap();
//! let near_duplicate = ha.similarity(&hb) >= 0.95;
//! ```

use crate::error::{HarvestError, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Side length of the `Mean32` sampling grid.
pub const MEAN32_GRID: u32 = 32;

/// `Mean32` hash size in bytes (1024 bits).
pub const MEAN32_HASH_SIZE: usize = (MEAN32_GRID * MEAN32_GRID / 8) as usize;

/// Perceptual hash algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// 32×32 mean-threshold luminance hash, 1024 bits.
    #[default]
    Mean32,
    /// Blockhash64 - consistent 64-bit output, grid-based algorithm.
    Blockhash64,
}

impl HashAlgorithm {
    /// Expected hash length in bytes.
    pub fn byte_len(self) -> usize {
        match self {
            Self::Mean32 => MEAN32_HASH_SIZE,
            Self::Blockhash64 => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mean32 => "mean32",
            Self::Blockhash64 => "blockhash64",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean32" => Ok(Self::Mean32),
            "blockhash64" => Ok(Self::Blockhash64),
            other => Err(HarvestError::ConfigError(format!(
                "Unknown hash algorithm '{other}'"
            ))),
        }
    }
}

/// Computed perceptual hash with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerceptualHash {
    /// Packed hash bits, MSB-first.
    pub hash: Vec<u8>,
    /// Algorithm used to compute the hash
    pub algorithm: HashAlgorithm,
    /// Hash size in bits
    pub bit_size: u32,
}

impl PerceptualHash {
    /// Create from packed bytes.
    pub fn from_bytes(hash: Vec<u8>, algorithm: HashAlgorithm) -> Self {
        let bit_size = (hash.len() * 8) as u32;
        Self {
            hash,
            algorithm,
            bit_size,
        }
    }

    /// Pack a row-major bit sequence MSB-first.
    pub fn from_bits(bits: impl IntoIterator<Item = bool>, algorithm: HashAlgorithm) -> Self {
        let mut bytes = Vec::new();
        for (i, bit) in bits.into_iter().enumerate() {
            if i % 8 == 0 {
                bytes.push(0u8);
            }
            if bit {
                if let Some(last) = bytes.last_mut() {
                    *last |= 0x80 >> (i % 8);
                }
            }
        }
        Self::from_bytes(bytes, algorithm)
    }

    /// Hamming distance, or `None` when the hashes are not comparable.
    pub fn hamming_distance(&self, other: &Self) -> Option<u32> {
        if self.algorithm != other.algorithm {
            return None;
        }
        hamming_distance(&self.hash, &other.hash)
    }

    /// Normalized Hamming similarity in `[0.0, 1.0]`.
    ///
    /// Hashes of different length or algorithm compare as `0.0`.
    pub fn similarity(&self, other: &Self) -> f64 {
        if self.algorithm != other.algorithm {
            return 0.0;
        }
        hamming_similarity(&self.hash, &other.hash)
    }

    /// `true` when `similarity(other) >= threshold`.
    pub fn is_similar(&self, other: &Self, threshold: f64) -> bool {
        self.similarity(other) >= threshold
    }

    /// Get the hash as a hexadecimal string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.hash)
    }

    /// Create a perceptual hash from a hexadecimal string.
    pub fn from_hex(hex_str: &str, algorithm: HashAlgorithm) -> Result<Self> {
        let hash = hex::decode(hex_str)
            .map_err(|e| HarvestError::PerceptualHashError(format!("Invalid hex string: {}", e)))?;
        Ok(Self::from_bytes(hash, algorithm))
    }

    /// Check if this hash has the size its algorithm produces.
    pub fn is_standard_size(&self) -> bool {
        self.hash.len() == self.algorithm.byte_len()
    }
}

/// Perceptual hasher configuration and computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerceptualHasher {
    algorithm: HashAlgorithm,
}

impl PerceptualHasher {
    /// Create a new perceptual hasher with the specified algorithm.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Compute perceptual hash from raw image bytes.
    ///
    /// Supports JPEG, PNG, GIF, and WebP formats.
    pub fn hash_bytes(&self, image_data: &[u8]) -> Result<PerceptualHash> {
        let image = image::load_from_memory(image_data).map_err(|e| {
            HarvestError::PerceptualHashError(format!("Failed to decode image: {}", e))
        })?;

        self.hash_image(&image)
    }

    /// Compute perceptual hash from a DynamicImage.
    pub fn hash_image(&self, image: &DynamicImage) -> Result<PerceptualHash> {
        match self.algorithm {
            HashAlgorithm::Mean32 => Ok(mean32(image)),
            HashAlgorithm::Blockhash64 => blockhash(image),
        }
    }

    /// Get the algorithm used by this hasher.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

fn mean32(image: &DynamicImage) -> PerceptualHash {
    let luma = image.to_luma8();
    let grid = image::imageops::resize(&luma, MEAN32_GRID, MEAN32_GRID, FilterType::Lanczos3);

    let pixels: Vec<u8> = grid.pixels().map(|p| p.0[0]).collect();
    let mean = pixels.iter().map(|&v| f64::from(v)).sum::<f64>() / pixels.len() as f64;

    PerceptualHash::from_bits(
        pixels.iter().map(|&v| f64::from(v) > mean),
        HashAlgorithm::Mean32,
    )
}

#[cfg(feature = "blockhash")]
fn blockhash(image: &DynamicImage) -> Result<PerceptualHash> {
    use blockhash::{blockhash64, Blockhash64};

    let hash: Blockhash64 = blockhash64(image);
    let hash_bytes: [u8; 8] = hash.into();
    Ok(PerceptualHash::from_bytes(
        hash_bytes.to_vec(),
        HashAlgorithm::Blockhash64,
    ))
}

#[cfg(not(feature = "blockhash"))]
fn blockhash(_image: &DynamicImage) -> Result<PerceptualHash> {
    Err(HarvestError::PerceptualHashError(
        "Blockhash64 requires the `blockhash` feature".into(),
    ))
}

/// Compute Hamming distance between two equal-length byte arrays.
///
/// Returns `None` if either array is empty or the lengths differ.
pub fn hamming_distance(hash1: &[u8], hash2: &[u8]) -> Option<u32> {
    if hash1.is_empty() || hash1.len() != hash2.len() {
        return None;
    }

    Some(
        hash1
            .iter()
            .zip(hash2.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum(),
    )
}

/// Fraction of matching bits between two equal-length byte arrays.
///
/// Mismatched or empty inputs are fully dissimilar.
pub fn hamming_similarity(hash1: &[u8], hash2: &[u8]) -> f64 {
    match hamming_distance(hash1, hash2) {
        Some(distance) => {
            let bits = (hash1.len() * 8) as f64;
            1.0 - f64::from(distance) / bits
        }
        None => 0.0,
    }
}
