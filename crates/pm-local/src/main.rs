//! Local portmux agent binary

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pm_core::config::{self, LocalConfig};
use pm_local::LocalAgent;

#[derive(Parser, Debug)]
#[command(name = "pm-local", version, about = "Client-facing portmux agent")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, env = "PM_LOCAL_CONFIG")]
    config: Option<PathBuf>,

    /// Server agent host, overrides the config file
    #[arg(long)]
    server: Option<String>,

    /// Client-facing listen port, overrides the config file
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
        .unwrap_or_else(|| config::default_config_dir().join("local.toml"));

    let mut cfg: LocalConfig = config::load_config(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    if let Some(server) = cli.server {
        cfg.server_host = server;
    }
    if let Some(port) = cli.listen_port {
        cfg.listen_port = port;
    }

    info!(
        listen = %cfg.listen_address(),
        server = %format!("{}:{}", cfg.server_host, cfg.server_port),
        forward = %cfg.forward_target(),
        "starting local agent"
    );

    let agent = LocalAgent::new(cfg).context("initializing local agent")?;

    tokio::select! {
        result = agent.run() => result.context("local agent failed")?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }
    Ok(())
}
