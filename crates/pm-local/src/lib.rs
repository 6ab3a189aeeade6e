//! pm-local: the client-facing portmux agent
//!
//! Maintains one encrypted tunnel to the server agent and turns every
//! accepted client connection into a multiplexed session on it. When the
//! tunnel drops, all sessions die with it and the agent reconnects on a
//! fixed interval.

pub mod agent;

pub use agent::LocalAgent;
