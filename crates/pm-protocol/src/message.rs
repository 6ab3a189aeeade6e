//! Frame payload types
//!
//! A frame carries either forwarded session bytes or a tunnel control
//! message. Payloads are hand-encoded with fixed-width big-endian integers;
//! both ends must agree on this layout out-of-band.
//!
//! # Wire layout
//!
//! Session payload:   `session_id: u32` + raw bytes (possibly empty)
//! Tunnel payload:    `method: u8` + method payload
//!   NewSession:      `session_id: u32`, `proto: u8`, `addr_kind: u8`,
//!                    address bytes (4 / len-prefixed / 16), `port: u16`
//!   SessionDestroy:  `session_id: u32`

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::frame::FrameType;
use crate::session::SessionId;

/// Tunnel control method tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TunnelMethod {
    /// Request the peer to open a mirrored session
    NewSession = 0x01,
    /// Notify the peer that a session ended
    SessionDestroy = 0x02,
}

impl TunnelMethod {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::NewSession),
            0x02 => Some(Self::SessionDestroy),
            _ => None,
        }
    }
}

/// Transport protocol of a proxied session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtoType {
    Tcp = 0x01,
    Udp = 0x02,
}

impl ProtoType {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Tcp),
            0x02 => Some(Self::Udp),
            _ => None,
        }
    }
}

// Address kind tags, SOCKS5-compatible
const ADDR_IPV4: u8 = 0x01;
const ADDR_DOMAIN: u8 = 0x03;
const ADDR_IPV6: u8 = 0x04;

/// Target address for a proxied session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Ipv4(Ipv4Addr, u16),
    Ipv6(Ipv6Addr, u16),
    Domain(String, u16),
}

impl Address {
    /// Classify an already-parsed host string as IPv4, IPv6 or domain
    pub fn from_host_port(host: &str, port: u16) -> Self {
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => Address::Ipv4(ip, port),
            Ok(IpAddr::V6(ip)) => Address::Ipv6(ip, port),
            Err(_) => Address::Domain(host.to_string(), port),
        }
    }

    /// Target port
    pub fn port(&self) -> u16 {
        match self {
            Address::Ipv4(_, port) => *port,
            Address::Ipv6(_, port) => *port,
            Address::Domain(_, port) => *port,
        }
    }

    /// Socket address, if the target is a literal IP
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Address::Ipv4(ip, port) => Some(SocketAddr::new(IpAddr::V4(*ip), *port)),
            Address::Ipv6(ip, port) => Some(SocketAddr::new(IpAddr::V6(*ip), *port)),
            Address::Domain(_, _) => None,
        }
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            Address::Ipv4(ip, port) => {
                dst.put_u8(ADDR_IPV4);
                dst.put_slice(&ip.octets());
                dst.put_u16(*port);
            }
            Address::Ipv6(ip, port) => {
                dst.put_u8(ADDR_IPV6);
                dst.put_slice(&ip.octets());
                dst.put_u16(*port);
            }
            Address::Domain(domain, port) => {
                if domain.len() > u8::MAX as usize {
                    return Err(ProtocolError::DomainTooLong(domain.len()));
                }
                dst.put_u8(ADDR_DOMAIN);
                dst.put_u8(domain.len() as u8);
                dst.put_slice(domain.as_bytes());
                dst.put_u16(*port);
            }
        }
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        need(src, 1)?;
        let kind = src.get_u8();
        match kind {
            ADDR_IPV4 => {
                need(src, 4 + 2)?;
                let mut octets = [0u8; 4];
                src.copy_to_slice(&mut octets);
                let port = src.get_u16();
                Ok(Address::Ipv4(Ipv4Addr::from(octets), port))
            }
            ADDR_IPV6 => {
                need(src, 16 + 2)?;
                let mut octets = [0u8; 16];
                src.copy_to_slice(&mut octets);
                let port = src.get_u16();
                Ok(Address::Ipv6(Ipv6Addr::from(octets), port))
            }
            ADDR_DOMAIN => {
                need(src, 1)?;
                let len = src.get_u8() as usize;
                need(src, len + 2)?;
                let raw = src.split_to(len);
                let domain = String::from_utf8_lossy(&raw).into_owned();
                let port = src.get_u16();
                Ok(Address::Domain(domain, port))
            }
            other => Err(ProtocolError::UnknownAddrKind(other)),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Ipv4(ip, port) => write!(f, "{}:{}", ip, port),
            Address::Ipv6(ip, port) => write!(f, "[{}]:{}", ip, port),
            Address::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

/// Request for the peer to open a mirrored session.
///
/// Carries the local side's session id so both ends address the same session
/// in subsequent frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionRequest {
    pub session_id: SessionId,
    pub proto: ProtoType,
    pub target: Address,
}

/// Forwarded bytes for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPackage {
    pub session_id: SessionId,
    pub data: Bytes,
}

/// Tunnel control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelMessage {
    NewSession(NewSessionRequest),
    SessionDestroy(SessionId),
}

impl TunnelMessage {
    /// Get the method tag for this message
    pub fn method(&self) -> TunnelMethod {
        match self {
            TunnelMessage::NewSession(_) => TunnelMethod::NewSession,
            TunnelMessage::SessionDestroy(_) => TunnelMethod::SessionDestroy,
        }
    }
}

/// One decoded wire unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Forwarded payload for one session
    Session(SessionPackage),
    /// Control message
    Control(TunnelMessage),
}

impl Frame {
    /// Forwarded bytes tagged with a session id
    pub fn session(session_id: SessionId, data: Bytes) -> Self {
        Frame::Session(SessionPackage { session_id, data })
    }

    /// NewSession control frame
    pub fn new_session(request: NewSessionRequest) -> Self {
        Frame::Control(TunnelMessage::NewSession(request))
    }

    /// SessionDestroy control frame
    pub fn session_destroy(session_id: SessionId) -> Self {
        Frame::Control(TunnelMessage::SessionDestroy(session_id))
    }

    /// Get the wire type tag for this frame
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Session(_) => FrameType::Session,
            Frame::Control(_) => FrameType::Tunnel,
        }
    }

    /// Encode the payload (everything after the frame header)
    pub fn encode_payload(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            Frame::Session(pkg) => {
                dst.put_u32(pkg.session_id.as_u32());
                dst.put_slice(&pkg.data);
            }
            Frame::Control(msg) => {
                dst.put_u8(msg.method().as_u8());
                match msg {
                    TunnelMessage::NewSession(req) => {
                        dst.put_u32(req.session_id.as_u32());
                        dst.put_u8(req.proto.as_u8());
                        req.target.encode(dst)?;
                    }
                    TunnelMessage::SessionDestroy(id) => {
                        dst.put_u32(id.as_u32());
                    }
                }
            }
        }
        Ok(())
    }

    /// Decode a payload of the given frame type
    pub fn decode_payload(frame_type: FrameType, mut payload: Bytes) -> Result<Self, ProtocolError> {
        match frame_type {
            FrameType::Session => {
                need(&payload, 4)?;
                let session_id = SessionId::new(payload.get_u32());
                Ok(Frame::session(session_id, payload))
            }
            FrameType::Tunnel => {
                need(&payload, 1)?;
                let method_byte = payload.get_u8();
                let method = TunnelMethod::from_u8(method_byte)
                    .ok_or(ProtocolError::UnknownMethod(method_byte))?;
                match method {
                    TunnelMethod::NewSession => {
                        need(&payload, 4 + 1)?;
                        let session_id = SessionId::new(payload.get_u32());
                        let proto_byte = payload.get_u8();
                        let proto = ProtoType::from_u8(proto_byte)
                            .ok_or(ProtocolError::UnknownProtoType(proto_byte))?;
                        let target = Address::decode(&mut payload)?;
                        Ok(Frame::new_session(NewSessionRequest {
                            session_id,
                            proto,
                            target,
                        }))
                    }
                    TunnelMethod::SessionDestroy => {
                        need(&payload, 4)?;
                        Ok(Frame::session_destroy(SessionId::new(payload.get_u32())))
                    }
                }
            }
        }
    }
}

fn need(src: &Bytes, n: usize) -> Result<(), ProtocolError> {
    if src.remaining() < n {
        return Err(ProtocolError::TruncatedPayload {
            expected: n,
            actual: src.remaining(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) -> Frame {
        let mut buf = BytesMut::new();
        frame.encode_payload(&mut buf).unwrap();
        Frame::decode_payload(frame.frame_type(), buf.freeze()).unwrap()
    }

    #[test]
    fn test_method_tag_roundtrip() {
        for method in [TunnelMethod::NewSession, TunnelMethod::SessionDestroy] {
            assert_eq!(TunnelMethod::from_u8(method.as_u8()), Some(method));
        }
        assert_eq!(TunnelMethod::from_u8(0x7F), None);
    }

    #[test]
    fn test_session_payload_roundtrip() {
        let frame = Frame::session(SessionId::new(7), Bytes::from_static(b"PING"));
        assert_eq!(roundtrip(frame.clone()), frame);
    }

    #[test]
    fn test_session_payload_empty() {
        let frame = Frame::session(SessionId::new(0), Bytes::new());
        assert_eq!(roundtrip(frame.clone()), frame);
    }

    #[test]
    fn test_new_session_ipv4_roundtrip() {
        let frame = Frame::new_session(NewSessionRequest {
            session_id: SessionId::new(3),
            proto: ProtoType::Tcp,
            target: Address::Ipv4(Ipv4Addr::new(127, 0, 0, 1), 9000),
        });
        assert_eq!(roundtrip(frame.clone()), frame);
    }

    #[test]
    fn test_new_session_ipv6_roundtrip() {
        let frame = Frame::new_session(NewSessionRequest {
            session_id: SessionId::new(u32::MAX),
            proto: ProtoType::Udp,
            target: Address::Ipv6(Ipv6Addr::LOCALHOST, 53),
        });
        assert_eq!(roundtrip(frame.clone()), frame);
    }

    #[test]
    fn test_new_session_max_domain_roundtrip() {
        let domain = "d".repeat(255);
        let frame = Frame::new_session(NewSessionRequest {
            session_id: SessionId::new(1),
            proto: ProtoType::Tcp,
            target: Address::Domain(domain, 443),
        });
        assert_eq!(roundtrip(frame.clone()), frame);
    }

    #[test]
    fn test_domain_too_long() {
        let frame = Frame::new_session(NewSessionRequest {
            session_id: SessionId::new(1),
            proto: ProtoType::Tcp,
            target: Address::Domain("d".repeat(256), 443),
        });
        let mut buf = BytesMut::new();
        let result = frame.encode_payload(&mut buf);
        assert!(matches!(result, Err(ProtocolError::DomainTooLong(256))));
    }

    #[test]
    fn test_session_destroy_roundtrip() {
        let frame = Frame::session_destroy(SessionId::new(99));
        assert_eq!(roundtrip(frame.clone()), frame);
    }

    #[test]
    fn test_unknown_method() {
        let payload = Bytes::from_static(&[0x7F, 0, 0, 0, 1]);
        let result = Frame::decode_payload(FrameType::Tunnel, payload);
        assert!(matches!(result, Err(ProtocolError::UnknownMethod(0x7F))));
    }

    #[test]
    fn test_unknown_addr_kind() {
        // method, session_id, proto, bogus addr kind
        let payload = Bytes::from_static(&[0x01, 0, 0, 0, 1, 0x01, 0x05]);
        let result = Frame::decode_payload(FrameType::Tunnel, payload);
        assert!(matches!(result, Err(ProtocolError::UnknownAddrKind(0x05))));
    }

    #[test]
    fn test_truncated_session_payload() {
        let payload = Bytes::from_static(&[0, 0, 1]);
        let result = Frame::decode_payload(FrameType::Session, payload);
        assert!(matches!(result, Err(ProtocolError::TruncatedPayload { .. })));
    }

    #[test]
    fn test_address_classification() {
        assert!(matches!(
            Address::from_host_port("10.0.0.1", 80),
            Address::Ipv4(_, 80)
        ));
        assert!(matches!(
            Address::from_host_port("::1", 80),
            Address::Ipv6(_, 80)
        ));
        assert!(matches!(
            Address::from_host_port("example.com", 80),
            Address::Domain(_, 80)
        ));
    }
}
