//! pubsub-bench - load generation and measurement for pub/sub message buses

use anyhow::Result;
use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("pubsub-bench starting...");

    let json = cli.json;
    let result = cli::run(cli).await?;
    cli::print_result(&result, json)?;

    Ok(())
}
