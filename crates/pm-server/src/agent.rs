//! Server agent: tunnel accept loop

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pm_core::config::ServerConfig;
use pm_core::{tls, ProxyError};
use pm_tunnel::{Tunnel, TunnelRole};

/// The server portmux agent.
///
/// Accepts any number of concurrent tunnels; each gets its own session
/// registry, so session ids only need to be unique per tunnel.
pub struct ServerAgent {
    config: ServerConfig,
    acceptor: TlsAcceptor,
    shutdown: CancellationToken,
}

impl ServerAgent {
    /// Build an agent from its configuration, loading TLS material eagerly
    pub fn new(config: ServerConfig) -> Result<Self, ProxyError> {
        let acceptor = tls::acceptor(&config.cert_path, &config.key_path)?;
        Ok(Self {
            config,
            acceptor,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops the accept loop and disconnects every open tunnel
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept tunnels until shut down
    pub async fn run(&self) -> Result<(), ProxyError> {
        let listener = TcpListener::bind(self.config.listen_address()).await?;
        info!(listen = %self.config.listen_address(), "accepting tunnels");

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let (tcp, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("tunnel accept failed: {}", e);
                    continue;
                }
            };
            let _ = tcp.set_nodelay(true);

            // Handshake off the accept loop so a stalled client cannot
            // block other tunnels
            let acceptor = self.acceptor.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                match acceptor.accept(tcp).await {
                    Ok(stream) => {
                        info!(peer = %peer, "tunnel established");
                        let tunnel = Tunnel::new(TunnelRole::Server);
                        tunnel.start(stream);
                        tokio::select! {
                            _ = shutdown.cancelled() => tunnel.disconnect(),
                            _ = tunnel.closed() => {}
                        }
                        info!(peer = %peer, "tunnel closed");
                    }
                    Err(e) => {
                        warn!(peer = %peer, "TLS handshake failed: {}", e);
                    }
                }
            });
        }

        info!("server agent stopped");
        Ok(())
    }
}
