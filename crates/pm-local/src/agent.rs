//! Local agent: tunnel initiator and client-facing accept loop

use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{info, warn};

use pm_core::config::LocalConfig;
use pm_core::{resolve, tls, ConnectionError, ProxyError};
use pm_tunnel::{Session, Tunnel, TunnelRole};

/// The local portmux agent.
///
/// `run` reconnects forever; each connected tunnel gets its own
/// client-facing listener, so clients are refused while no tunnel is up.
pub struct LocalAgent {
    config: LocalConfig,
    connector: TlsConnector,
}

impl LocalAgent {
    /// Build an agent from its configuration. Loads TLS material eagerly so
    /// bad paths fail at startup, not on first connect.
    pub fn new(config: LocalConfig) -> Result<Self, ProxyError> {
        let client_pair = match (&config.cert_path, &config.key_path) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        };
        let connector = tls::connector(&config.ca_path, client_pair)?;
        Ok(Self { config, connector })
    }

    /// Run the reconnect loop until cancelled by the caller.
    ///
    /// The retry interval applies to failed connect attempts only; losing an
    /// established tunnel reconnects immediately.
    pub async fn run(&self) -> Result<(), ProxyError> {
        loop {
            match self.connect_tunnel().await {
                Ok(stream) => {
                    info!(
                        server = %self.config.server_host,
                        port = self.config.server_port,
                        "tunnel established"
                    );
                    match self.serve_tunnel(stream).await {
                        Ok(()) => continue,
                        Err(e) => warn!("tunnel serving failed: {}", e),
                    }
                }
                Err(e) => {
                    warn!(
                        server = %self.config.server_host,
                        "tunnel connect failed: {}",
                        e
                    );
                }
            }
            info!(
                seconds = self.config.retry_interval.as_secs_f64(),
                "retrying tunnel"
            );
            sleep(self.config.retry_interval).await;
        }
    }

    /// Dial the server agent and complete the TLS handshake
    async fn connect_tunnel(&self) -> Result<TlsStream<TcpStream>, ProxyError> {
        let addrs = resolve::resolve(&self.config.server_host, self.config.server_port).await?;
        // resolve guarantees at least one endpoint
        let addr = addrs[0];

        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| ConnectionError::Disconnected(e.to_string()))?;
        tcp.set_nodelay(true)?;

        let name = tls::server_name(&self.config.server_host)?;
        let stream = self
            .connector
            .connect(name, tcp)
            .await
            .map_err(|e| ConnectionError::HandshakeFailed(e.to_string()))?;
        Ok(stream)
    }

    /// Accept clients onto the tunnel until it goes down
    async fn serve_tunnel(&self, stream: TlsStream<TcpStream>) -> Result<(), ProxyError> {
        let tunnel = Tunnel::new(TunnelRole::Local);
        tunnel.start(stream);

        let listener = TcpListener::bind(self.config.listen_address()).await?;
        info!(listen = %self.config.listen_address(), "accepting clients");

        loop {
            let accepted = tokio::select! {
                _ = tunnel.closed() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((client, peer)) => {
                    let _ = client.set_nodelay(true);
                    let session = Session::local(
                        tunnel.clone(),
                        client,
                        self.config.forward_proto.into(),
                        self.config.forward_target(),
                    );
                    info!(id = %session.id(), client = %peer, "client connected");
                    tunnel.manager().insert_and_start(session);
                }
                Err(e) => {
                    warn!("accept failed: {}", e);
                }
            }
        }

        info!("tunnel lost, dropping client listener");
        Ok(())
    }
}
