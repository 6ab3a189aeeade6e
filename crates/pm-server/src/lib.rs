//! pm-server: the upstream-facing portmux agent
//!
//! Listens for encrypted tunnel connections from local agents. Every
//! NewSession request arriving on a tunnel opens a TCP or UDP socket to the
//! requested target and forwards between it and the tunnel. Each tunnel
//! carries its own independent session registry.

pub mod agent;

pub use agent::ServerAgent;
