//! pm-core: Shared infrastructure for portmux
//!
//! Configuration files, the error taxonomy, TLS stream setup and name
//! resolution used by both the local and server agents.

pub mod config;
pub mod error;
pub mod resolve;
pub mod tls;

pub use error::{ConfigError, ConnectionError, ProxyError, SessionError};
