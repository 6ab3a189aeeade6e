//! Server agent configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the server agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the tunnel listener to
    pub listen_addr: String,

    /// Tunnel listener port
    pub listen_port: u16,

    /// Server certificate chain (PEM)
    pub cert_path: PathBuf,

    /// Server private key (PEM)
    pub key_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let config_dir = super::default_config_dir();

        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 7000,
            cert_path: config_dir.join("server.pem"),
            key_path: config_dir.join("server.key"),
        }
    }
}

impl ServerConfig {
    /// Tunnel listen address
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}
