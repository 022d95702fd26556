//! Metaforce installer entry point.

mod app;
mod args;
mod config;
mod progress;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = args::Cli::parse();

    // Load configuration.
    let config = config::Config::load(cli.config.as_deref())?;

    // Logs go to stderr so they never interleave with the progress line.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting metaforce installer"
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli, config))
}
