//! pm-protocol: Wire protocol for portmux tunnel multiplexing
//!
//! This crate defines the binary framing protocol carried on the encrypted
//! tunnel between the local and server agents. A frame is either forwarded
//! session payload (tagged with a session id) or a control message
//! (new session, session destroy).

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod session;

pub use codec::FrameCodec;
pub use error::ProtocolError;
pub use frame::{FrameHeader, FrameType, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{
    Address, Frame, NewSessionRequest, ProtoType, SessionPackage, TunnelMessage, TunnelMethod,
};
pub use session::{SessionId, SESSION_ID_MAX};

/// Fixed receive chunk size for session forwarding. UDP payloads larger than
/// this are not reassembled; each forwarded buffer must fit one chunk.
pub const CHUNK_SIZE: usize = 4 * 1024;
