//! Local agent configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use pm_protocol::{Address, ProtoType};

/// Upstream protocol for forwarded sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardProto {
    Tcp,
    Udp,
}

impl From<ForwardProto> for ProtoType {
    fn from(proto: ForwardProto) -> Self {
        match proto {
            ForwardProto::Tcp => ProtoType::Tcp,
            ForwardProto::Udp => ProtoType::Udp,
        }
    }
}

/// Configuration for the local agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Server agent host to tunnel to
    pub server_host: String,

    /// Server agent tunnel port
    pub server_port: u16,

    /// Address to bind the client-facing listener to
    pub listen_addr: String,

    /// Client-facing listener port
    pub listen_port: u16,

    /// Forward target host (IP literal or domain; resolved on the server side)
    pub forward_host: String,

    /// Forward target port
    pub forward_port: u16,

    /// Upstream protocol the server opens for each session
    pub forward_proto: ForwardProto,

    /// Trusted CA bundle for verifying the server certificate
    pub ca_path: PathBuf,

    /// Client certificate, presented to the server when set
    pub cert_path: Option<PathBuf>,

    /// Client private key, paired with `cert_path`
    pub key_path: Option<PathBuf>,

    /// Fixed delay between tunnel connect attempts
    #[serde(with = "duration_secs")]
    pub retry_interval: Duration,
}

impl Default for LocalConfig {
    fn default() -> Self {
        let config_dir = super::default_config_dir();

        Self {
            server_host: "localhost".to_string(),
            server_port: 7000,
            listen_addr: "127.0.0.1".to_string(),
            listen_port: 1080,
            forward_host: "127.0.0.1".to_string(),
            forward_port: 8080,
            forward_proto: ForwardProto::Tcp,
            ca_path: config_dir.join("ca.pem"),
            cert_path: None,
            key_path: None,
            retry_interval: Duration::from_secs(5),
        }
    }
}

impl LocalConfig {
    /// Client-facing listen address
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }

    /// Forward target classified as IPv4/IPv6/domain
    pub fn forward_target(&self) -> Address {
        Address::from_host_port(&self.forward_host, self.forward_port)
    }
}
