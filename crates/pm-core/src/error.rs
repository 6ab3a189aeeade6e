//! Core error types for portmux

use pm_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the portmux agents
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tunnel connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// TLS handshake failed
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),

    /// TLS configuration could not be built
    #[error("TLS setup error: {0}")]
    TlsSetup(String),

    /// Server name is not a valid TLS name
    #[error("Invalid server name: {0}")]
    InvalidServerName(String),

    /// Name resolution failed
    #[error("Resolve failed for {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Name resolved to no endpoints
    #[error("No endpoints resolved for {0}")]
    NoEndpoints(String),

    /// Tunnel connection lost
    #[error("Tunnel disconnected: {0}")]
    Disconnected(String),
}

/// Per-session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Upstream connect failed (Server side)
    #[error("Upstream connect to {target} failed: {source}")]
    UpstreamConnect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The owning tunnel is already gone
    #[error("Tunnel closed")]
    TunnelClosed,

    /// Session was started twice
    #[error("Session already started")]
    AlreadyStarted,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
