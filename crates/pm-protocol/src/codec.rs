//! Tokio codec for framed protocol messages

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{FrameHeader, MAX_PAYLOAD_SIZE};
use crate::message::Frame;

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Current header being decoded (if any)
    pending_header: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Try to decode a header if we don't have one
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match FrameHeader::decode(src)? {
                Some(h) => h,
                None => return Ok(None), // Need more data
            },
        };

        // Check the declared payload length
        let payload_len = header.payload_length as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        // Check if we have enough data for the payload
        if src.len() < payload_len {
            // Save the header and wait for more data
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(payload_len).freeze();
        let frame = Frame::decode_payload(header.frame_type, payload)?;

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // Encode the payload first so the header carries its exact length
        let mut payload = BytesMut::new();
        frame.encode_payload(&mut payload)?;

        let payload_len = payload.len();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let header = FrameHeader::new(frame.frame_type(), payload_len as u32);
        header.encode(dst);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HEADER_SIZE;
    use crate::message::{Address, NewSessionRequest, ProtoType};
    use crate::session::SessionId;
    use bytes::Bytes;

    #[test]
    fn test_codec_roundtrip() {
        let mut codec = FrameCodec::new();

        let frame = Frame::new_session(NewSessionRequest {
            session_id: SessionId::new(1),
            proto: ProtoType::Tcp,
            target: Address::from_host_port("example.com", 9000),
        });

        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_session_data() {
        let mut codec = FrameCodec::new();

        let frame = Frame::session(SessionId::new(42), Bytes::from_static(b"Hello, world!"));

        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = FrameCodec::new();

        let frame = Frame::session_destroy(SessionId::new(12345));

        let mut full_buf = BytesMut::new();
        codec.encode(frame.clone(), &mut full_buf).unwrap();

        // Split mid-header to simulate a partial read
        let mut partial = full_buf.split_to(HEADER_SIZE - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        // Complete the header but not the payload
        partial.extend_from_slice(&full_buf.split_to(2));
        assert!(codec.decode(&mut partial).unwrap().is_none());

        // Now the rest
        partial.extend_from_slice(&full_buf);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_codec_back_to_back_frames() {
        let mut codec = FrameCodec::new();

        let a = Frame::session(SessionId::new(1), Bytes::from_static(b"first"));
        let b = Frame::session(SessionId::new(2), Bytes::from_static(b"second"));

        let mut buf = BytesMut::new();
        codec.encode(a.clone(), &mut buf).unwrap();
        codec.encode(b.clone(), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), a);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_codec_rejects_oversized_length() {
        let mut codec = FrameCodec::new();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF]);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
    }
}
