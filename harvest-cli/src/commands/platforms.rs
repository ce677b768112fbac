//! Platforms command implementation.

use anyhow::Result;
use colored::Colorize;
use harvest_core::{platform_presets, PLATFORM_PRESETS};

use crate::utils::print_json;
use crate::OutputFormat;

/// Execute the platforms command.
pub fn execute(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&platform_presets()),
        OutputFormat::Text => {
            for (name, size) in PLATFORM_PRESETS {
                println!("{:<16} {}", name.cyan(), size);
            }
            Ok(())
        }
    }
}
