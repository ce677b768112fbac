#![no_main]

//! Fuzz target for PerceptualHasher::hash_bytes()
//!
//! Downloaded bodies are untrusted: anything a server labels `image/*` ends
//! up here. Decoding failures must surface as errors, never panics.
//!
//! Run with: cargo +nightly fuzz run fuzz_hash_bytes

use harvest_core::{HashAlgorithm, PerceptualHasher};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(hash) = PerceptualHasher::new(HashAlgorithm::Mean32).hash_bytes(data) {
        assert_eq!(hash.hash.len(), HashAlgorithm::Mean32.byte_len());
        assert_eq!(hash.similarity(&hash), 1.0);
    }
});
