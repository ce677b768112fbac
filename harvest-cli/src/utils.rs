//! Common utility functions shared across CLI commands.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use harvest_core::{platform_preset, AcquisitionReport, HarvestError, Size};

/// Parse `NAME=WxH` into a platform entry.
pub fn parse_platform_size(s: &str) -> std::result::Result<(String, Size), HarvestError> {
    let (name, size) = s.split_once('=').ok_or_else(|| {
        HarvestError::ConfigError(format!("Invalid platform size '{s}', expected NAME=WxH"))
    })?;
    let name = name.trim();
    harvest_core::model::validate_platform_name(name)?;
    Ok((name.to_string(), size.parse()?))
}

/// Resolve `--platform` preset names and `--size` entries into one map.
///
/// A `--size` entry overrides a preset of the same name.
pub fn resolve_platforms(
    presets: &[String],
    sizes: &[(String, Size)],
) -> Result<BTreeMap<String, Size>> {
    let mut platforms = BTreeMap::new();
    for name in presets {
        let Some(size) = platform_preset(name) else {
            bail!(HarvestError::ConfigError(format!(
                "Unknown platform preset '{name}' (see `harvest platforms`)"
            )));
        };
        platforms.insert(name.clone(), size);
    }
    for (name, size) in sizes {
        platforms.insert(name.clone(), *size);
    }
    Ok(platforms)
}

/// Format a duration as seconds with millisecond precision.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f64())
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

/// Human-readable report summary on stdout.
pub fn print_report(report: &AcquisitionReport) {
    println!();
    let headline = if report.cancelled {
        "Acquisition cancelled (partial results)".yellow().bold()
    } else if report.is_clean() {
        "Acquisition complete".green().bold()
    } else {
        "Acquisition complete with errors".yellow().bold()
    };
    println!("{headline}");
    println!();
    println!(
        "   {} {}",
        "Candidates:".dimmed(),
        report.candidates_discovered
    );
    println!(
        "   {} {}",
        "Accepted:".dimmed(),
        report.accepted.len().to_string().green()
    );
    println!("   {} {}", "Duplicates:".dimmed(), report.duplicates_skipped);
    println!(
        "   {} {}",
        "Variants:".dimmed(),
        report.variants().count()
    );
    if report.hash_failures > 0 {
        println!(
            "   {} {}",
            "Unhashed:".dimmed(),
            report.hash_failures.to_string().yellow()
        );
    }
    println!(
        "   {} {} (peak {} concurrent downloads)",
        "Elapsed:".dimmed(),
        format_elapsed(report.elapsed),
        report.peak_concurrent_downloads
    );

    if !report.accepted.is_empty() {
        println!();
        for accepted in &report.accepted {
            println!(
                "   {} {}",
                "+".green(),
                accepted.asset.local_path.display()
            );
            for variant in &accepted.variants {
                println!(
                    "     {} {} {}",
                    variant.platform.cyan(),
                    variant.size.to_string().dimmed(),
                    variant.path.display()
                );
            }
            for failure in &accepted.render_failures {
                println!(
                    "     {} {}: {}",
                    "!".red(),
                    failure.platform,
                    failure.message
                );
            }
        }
    }

    if !report.provider_errors.is_empty() || !report.download_errors.is_empty() {
        println!();
        for failure in &report.provider_errors {
            println!(
                "   {} {}: {}",
                "provider".red(),
                failure.provider,
                failure.error
            );
        }
        for failure in &report.download_errors {
            println!(
                "   {} {}: {}",
                "download".red(),
                failure.url,
                failure.error
            );
        }
    }
}
