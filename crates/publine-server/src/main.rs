//! Publine Server - publish/subscribe broker over a line protocol
//!
//! This is the main entry point for the Publine broker.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use publine_server::{load_config, logging, Server};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "publine", version, about = "Minimal publish/subscribe broker")]
struct Args {
    /// Configuration file (defaults to config/default.* when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides server.host and server.port
    #[arg(short, long)]
    listen: Option<String>,

    /// Topic to serve; repeat for several. Replaces broker.topics.
    #[arg(short, long = "topic")]
    topics: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings =
        load_config(args.config.as_deref()).context("failed to load configuration")?;
    if !args.topics.is_empty() {
        settings.broker.topics = args.topics;
    }

    logging::init(&settings.log);

    let server = Server::from_settings(&settings).context("invalid configuration")?;
    let bind = args
        .listen
        .unwrap_or_else(|| settings.server.bind_addr());
    let addr = server
        .listen(bind.as_str())
        .await
        .with_context(|| format!("failed to listen on {bind}"))?;

    info!(
        addr = %addr,
        topics = ?settings.broker.topics,
        "Publine broker ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutdown signal received");

    server.stop();
    server.wait().await;

    Ok(())
}
