use anyhow::Result;
use clap::Parser;
use ringlogd::config::ServerConfig;
use ringlogd::server::{self, ServerContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ringlogd")]
#[command(about = "Bounded command log daemon: clients append lines, receive the full log back")]
#[command(version)]
struct Cli {
    /// YAML config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Ring capacity in commands
    #[arg(long)]
    capacity: Option<usize>,

    /// Backing file mirroring the log contents
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Accepted for compatibility with init scripts; the process always runs
    /// in the foreground
    #[arg(short = 'd', long)]
    daemon: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(capacity) = cli.capacity {
        config.capacity = capacity;
    }
    if let Some(log_file) = cli.log_file {
        config.log_file = Some(log_file);
    }
    config.validate()?;

    if cli.daemon {
        tracing::warn!("-d is accepted for compatibility; running in the foreground");
    }

    let ctx = Arc::new(ServerContext::new(config)?);
    server::run(ctx).await
}
