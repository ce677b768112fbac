//! Example demonstrating provider search tracing instrumentation.
//!
//! Uses whichever provider credentials are set in the environment
//! (e.g. `PEXELS_API_KEY`).
//!
//! Run with: cargo run -p harvest-core --example provider_tracing -- "mountain lake"

use harvest_core::{ProviderFactory, Query, SearchProvider};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::new("harvest_core=debug,info"))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let term = std::env::args().nth(1).unwrap_or_else(|| "landscape".to_string());
    println!("=== Provider Search Tracing Demo ===\n");

    let providers = match ProviderFactory::from_env() {
        Ok(p) if !p.is_empty() => p,
        Ok(_) => {
            eprintln!("No provider API keys set (try PEXELS_API_KEY)");
            return;
        }
        Err(e) => {
            eprintln!("Failed to create providers: {}", e);
            return;
        }
    };

    let query = Query::new(term);
    for provider in &providers {
        println!("\nSearching {} for {:?}...\n", provider.id(), query.term);

        match provider.search(&query, 5).await {
            Ok(results) => {
                println!("\n{} result(s)", results.len());
                for result in results {
                    let size = result
                        .declared_size()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "?".into());
                    println!("   {:>10}  {}", size, result.url);
                }
            }
            Err(e) => println!("\nFailed: {}", e),
        }
    }
}
