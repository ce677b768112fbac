#![no_main]

//! Fuzz target for text parsing of sizes and stored hashes
//!
//! Both come from outside the process: CLI flags and the registry log.
//!
//! Run with: cargo +nightly fuzz run fuzz_parse

use harvest_core::{HashAlgorithm, PerceptualHash, Size};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(size) = text.parse::<Size>() {
        assert!(size.width > 0 && size.height > 0);
        assert_eq!(size.to_string().parse::<Size>().ok(), Some(size));
    }

    if let Ok(hash) = PerceptualHash::from_hex(text, HashAlgorithm::Mean32) {
        assert_eq!(hash.to_hex().len(), hash.hash.len() * 2);
    }
});
