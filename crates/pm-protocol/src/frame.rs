//! Frame header encoding/decoding
//!
//! The frame format uses a 5-byte header:
//! - frame_type: 1 byte (u8)
//! - payload_length: 4 bytes (u32, big-endian)
//!
//! Byte order is a wire-compatibility invariant: every integer on the wire
//! is big-endian.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 5;

/// Maximum accepted payload size. The length field is a u32, but anything
/// near that is a hostile or corrupted length, so decoding caps it.
pub const MAX_PAYLOAD_SIZE: usize = 0x00FF_FFFF;

/// Frame type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Forwarded payload for one session
    Session = 0x01,
    /// Tunnel control message
    Tunnel = 0x02,
}

impl FrameType {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Session),
            0x02 => Some(Self::Tunnel),
            _ => None,
        }
    }
}

/// Frame header containing the type tag and payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Kind of payload that follows
    pub frame_type: FrameType,
    /// Length of the payload in bytes (excludes the header)
    pub payload_length: u32,
}

impl FrameHeader {
    /// Create a new frame header
    pub fn new(frame_type: FrameType, payload_length: u32) -> Self {
        Self {
            frame_type,
            payload_length,
        }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u8(self.frame_type.as_u8());
        dst.put_u32(self.payload_length);
    }

    /// Decode a header from a byte buffer
    ///
    /// Returns None if there aren't enough bytes in the buffer.
    /// Returns Err if the type tag is not a defined frame type.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Validate the type tag before consuming anything
        let type_byte = src[0];
        let frame_type =
            FrameType::from_u8(type_byte).ok_or(ProtocolError::UnknownFrameType(type_byte))?;

        let _ = src.get_u8();
        let payload_length = src.get_u32();

        Ok(Some(Self {
            frame_type,
            payload_length,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = FrameHeader::new(FrameType::Session, 12345);

        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        header.encode(&mut buf);

        assert_eq!(buf.len(), HEADER_SIZE);

        let decoded = FrameHeader::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_big_endian_layout() {
        let header = FrameHeader::new(FrameType::Tunnel, 0x0102_0304);

        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        assert_eq!(&buf[..], &[0x02, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_insufficient_bytes() {
        let mut buf = BytesMut::from(&[0x01, 0, 0][..]);
        let result = FrameHeader::decode(&mut buf).unwrap();
        assert!(result.is_none());
        // Nothing consumed
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_unknown_frame_type() {
        let mut buf = BytesMut::from(&[0xFE, 0, 0, 0, 10][..]);
        let result = FrameHeader::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::UnknownFrameType(0xFE))));
    }
}
