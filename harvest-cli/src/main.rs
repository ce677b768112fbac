//! Harvest CLI - multi-provider image acquisition.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use harvest_core::{HashAlgorithm, Orientation, Size};
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error (invalid arguments)
  65  Input could not be decoded as an image
  66  Input file not found or unreadable
  69  Every search provider was unavailable
  74  I/O error (output directory or hash registry)
  75  Run cancelled or deadline reached (partial report printed)
  78  Configuration error (e.g. no provider API keys)";

#[derive(Parser)]
#[command(name = "harvest")]
#[command(author, version, about = "Multi-provider image acquisition with near-duplicate filtering", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Machine-readable JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Search every configured provider and download unique images
    Acquire(commands::acquire::AcquireArgs),

    /// Print perceptual hashes and pairwise similarity of local images
    Hash {
        /// Image files to hash
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Hash algorithm
        #[arg(short, long, default_value = "mean32", value_parser = parse_algorithm)]
        algorithm: HashAlgorithm,

        /// Similarity at or above which two files are reported as duplicates
        #[arg(short, long, default_value_t = 0.95)]
        threshold: f64,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List the built-in platform size presets
    Platforms {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

fn parse_algorithm(s: &str) -> Result<HashAlgorithm, String> {
    s.parse().map_err(|e: harvest_core::HarvestError| e.to_string())
}

pub(crate) fn parse_orientation(s: &str) -> Result<Orientation, String> {
    s.parse().map_err(|e: harvest_core::HarvestError| e.to_string())
}

pub(crate) fn parse_size_arg(s: &str) -> Result<(String, Size), String> {
    utils::parse_platform_size(s).map_err(|e| e.to_string())
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "harvest_core=info,harvest=info",
        (false, 1) => "harvest_core=debug,harvest=debug",
        (false, _) => "harvest_core=trace,harvest=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version land here too.
            let code = if err.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    init_tracing(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Acquire(args) => commands::acquire::execute(args, cli.quiet).await,
        Commands::Hash {
            files,
            algorithm,
            threshold,
            format,
        } => commands::hash::execute(files, algorithm, threshold, format, cli.quiet).await,
        Commands::Platforms { format } => commands::platforms::execute(format),
    };

    let exit = match result {
        Ok(()) => ExitCode::success(),
        Err(err) => ExitCode::from_anyhow(&err),
    };
    if let Some(message) = &exit.message {
        eprintln!("{} {}", "error:".red().bold(), message);
    }
    std::process::exit(exit.code);
}
