use anyhow::Result;
use clap::Parser;
use devstrap::cli::Commands;
use tracing_subscriber::EnvFilter;

/// devstrap - developer environment bootstrapper
#[derive(Parser, Debug)]
#[command(name = "devstrap", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("devstrap=info")),
        )
        .with_target(false)
        .init();

    Cli::parse().command.run().await
}
