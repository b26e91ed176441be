//! ChainPerf - Main Entry Point

use clap::Parser;
use chainperf::cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chainperf=info".into()),
        )
        .init();

    let cli = Cli::parse();
    run(cli)
}
