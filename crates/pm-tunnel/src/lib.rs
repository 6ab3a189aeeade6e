//! pm-tunnel: Tunnel multiplexing and session-forwarding engine
//!
//! One `Tunnel` carries every proxied connection between the two agents.
//! Each logical connection is a `Session` owning a local socket; the
//! `SessionManager` maps session ids to live sessions. All outbound frames
//! pass through a single writer task so frames never interleave on the wire;
//! each session likewise drains its socket writes through a single task.

pub mod manager;
pub mod session;
pub mod tunnel;

pub use manager::SessionManager;
pub use session::Session;
pub use tunnel::{Tunnel, TunnelRole};
