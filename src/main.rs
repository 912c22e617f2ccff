use clap::Parser;
use tracing_subscriber::EnvFilter;

use replistore::ReplicaStore;

mod cli;

use cli::{execute_command, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.load_config().await?;
    let storage = ReplicaStore::open(&config).await?;

    execute_command(&storage, cli.command).await
}
