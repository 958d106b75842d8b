//! Quarry CLI binary.

use anyhow::Result;
use quarry::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the quarry CLI.
///
/// Uses tokio's `current_thread` runtime; every command is a short
/// sequence of storage calls.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Example: RUST_LOG=quarry=debug,quarry_jsonl=trace quarry count tickets
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("quarry=info,quarry_jsonl=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting quarry CLI");

    let cli = Cli::parse_args();
    cli.execute().await?;

    tracing::debug!("Quarry CLI completed successfully");
    Ok(())
}
