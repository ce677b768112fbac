//! Hash command implementation.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use harvest_core::{HarvestError, HashAlgorithm, PerceptualHash, PerceptualHasher};
use serde_json::json;
use tracing::debug;

use crate::utils::print_json;
use crate::OutputFormat;

/// Execute the hash command.
pub async fn execute(
    files: Vec<PathBuf>,
    algorithm: HashAlgorithm,
    threshold: f64,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    if !(threshold > 0.0 && threshold <= 1.0) {
        bail!(HarvestError::ConfigError(format!(
            "threshold must be in (0, 1], got {threshold}"
        )));
    }

    let hasher = PerceptualHasher::new(algorithm);
    let mut hashes: Vec<(PathBuf, PerceptualHash)> = Vec::with_capacity(files.len());
    for file in files {
        let content = tokio::fs::read(&file)
            .await
            .with_context(|| format!("Failed to read file: {}", file.display()))?;
        let hash = hasher
            .hash_bytes(&content)
            .with_context(|| format!("Failed to hash {}", file.display()))?;
        debug!(path = %file.display(), bytes = content.len(), "Hashed file");
        hashes.push((file, hash));
    }

    let pairs: Vec<(usize, usize, f64)> = (0..hashes.len())
        .flat_map(|i| (i + 1..hashes.len()).map(move |j| (i, j)))
        .map(|(i, j)| (i, j, hashes[i].1.similarity(&hashes[j].1)))
        .collect();

    match format {
        OutputFormat::Json => {
            let files: Vec<_> = hashes
                .iter()
                .map(|(path, hash)| {
                    json!({
                        "path": path.display().to_string(),
                        "algorithm": hash.algorithm.as_str(),
                        "hash": hash.to_hex(),
                    })
                })
                .collect();
            let pairs: Vec<_> = pairs
                .iter()
                .map(|&(i, j, similarity)| {
                    json!({
                        "a": hashes[i].0.display().to_string(),
                        "b": hashes[j].0.display().to_string(),
                        "similarity": similarity,
                        "duplicate": similarity >= threshold,
                    })
                })
                .collect();
            print_json(&json!({ "files": files, "pairs": pairs }))
        }
        OutputFormat::Text if quiet => Ok(()),
        OutputFormat::Text => {
            for (path, hash) in &hashes {
                let hex = hash.to_hex();
                println!(
                    "{}  {}  {}",
                    hash.algorithm.as_str().dimmed(),
                    &hex[..hex.len().min(16)],
                    path.display()
                );
            }
            if !pairs.is_empty() {
                println!();
            }
            for &(i, j, similarity) in &pairs {
                let verdict = if similarity >= threshold {
                    "DUPLICATE".red().bold()
                } else {
                    "distinct".green()
                };
                println!(
                    "{:.4}  {}  {} <-> {}",
                    similarity,
                    verdict,
                    hashes[i].0.display(),
                    hashes[j].0.display()
                );
            }
            Ok(())
        }
    }
}
