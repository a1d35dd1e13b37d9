//! Beacon registry node daemon.
//!
//! # Quick Start
//!
//! ```bash
//! # Start a node from its JSON configuration
//! beacon-node start --config node.json
//!
//! # Override any field through the environment
//! BEACON_TTL_SECONDS=15 beacon-node start --config node.json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use beacon_config::NodeConfig;
use beacon_server::Node;

/// Beacon - a small replicated service registry.
#[derive(Parser)]
#[command(name = "beacon-node")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a registry node.
    Start {
        /// Path to the node's JSON configuration file.
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print version information.
    Version,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Start { config } => start(&config),
        Commands::Version => {
            println!("beacon-node {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn start(config_path: &std::path::Path) -> Result<()> {
    let config = NodeConfig::load(config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    let node = Node::start(config).context("starting registry node")?;
    info!(
        node_id = %node.node_id(),
        biz = %node.biz_addr(),
        hb = %node.hb_addr(),
        "registry node is serving"
    );

    wait_for_termination()?;
    info!("termination signal received");
    node.shutdown();
    Ok(())
}

/// Blocks until SIGINT or SIGTERM arrives.
#[cfg(unix)]
fn wait_for_termination() -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handler")?;
    let _ = signals.forever().next();
    Ok(())
}

#[cfg(windows)]
fn wait_for_termination() -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("installing ctrl-c handler")?;
    let _ = rx.recv();
    Ok(())
}
