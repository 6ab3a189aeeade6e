//! Server portmux agent binary

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pm_core::config::{self, ServerConfig};
use pm_server::ServerAgent;

#[derive(Parser, Debug)]
#[command(name = "pm-server", version, about = "Upstream-facing portmux agent")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, env = "PM_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Tunnel listen port, overrides the config file
    #[arg(long)]
    listen_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let path = cli
        .config
        .unwrap_or_else(|| config::default_config_dir().join("server.toml"));

    let mut cfg: ServerConfig = config::load_config(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    if let Some(port) = cli.listen_port {
        cfg.listen_port = port;
    }

    info!(listen = %cfg.listen_address(), "starting server agent");

    let agent = ServerAgent::new(cfg).context("initializing server agent")?;
    let shutdown = agent.shutdown_handle();

    tokio::select! {
        result = agent.run() => result.context("server agent failed")?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            shutdown.cancel();
        }
    }
    Ok(())
}
