//! Length-prefixed framing.
//!
//! # Frame layout
//!
//! ```text
//! [magic:2B][version:1B][reserved:1B][length:4B LE][payload:length bytes]
//! ```
//!
//! Decoding is incremental: [`Frame::decode`] returns `Ok(None)` until the
//! read buffer holds a complete frame, and consumes exactly one frame per
//! successful call.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::WireError;

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 2] = *b"BR";

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the fixed frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Maximum payload size accepted on the wire (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// One framed message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Creates a frame, rejecting oversized payloads.
    pub fn new(payload: Bytes) -> Result<Self, WireError> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge(payload.len()));
        }
        Ok(Self { payload })
    }

    /// Returns the frame payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Appends the encoded frame to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(FRAME_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&FRAME_MAGIC);
        buf.extend_from_slice(&[PROTOCOL_VERSION, 0]);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
    }

    /// Attempts to decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` if the buffer does not yet hold a complete frame;
    /// in that case nothing is consumed.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, WireError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        if buf[0..2] != FRAME_MAGIC {
            return Err(WireError::BadMagic);
        }
        if buf[2] != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedVersion(buf[2]));
        }
        let length = u32::from_le_bytes(
            buf[4..8]
                .try_into()
                .expect("slice is exactly 4 bytes after bounds check"),
        ) as usize;
        if length > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge(length));
        }
        if buf.len() < FRAME_HEADER_SIZE + length {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(length).freeze();
        Ok(Some(Frame { payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_single_frame() {
        let frame = Frame::new(Bytes::from_static(b"hello")).unwrap();
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);

        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.payload().as_ref(), b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_header_yields_none() {
        let mut buf = BytesMut::from(&b"BR"[..]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2, "nothing consumed on partial input");
    }

    #[test]
    fn partial_payload_yields_none() {
        let frame = Frame::new(Bytes::from_static(b"abcdef")).unwrap();
        let mut full = BytesMut::new();
        frame.encode(&mut full);

        let mut partial = BytesMut::from(&full[..full.len() - 2]);
        assert!(Frame::decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn two_frames_back_to_back() {
        let mut buf = BytesMut::new();
        Frame::new(Bytes::from_static(b"one"))
            .unwrap()
            .encode(&mut buf);
        Frame::new(Bytes::from_static(b"two"))
            .unwrap()
            .encode(&mut buf);

        let first = Frame::decode(&mut buf).unwrap().unwrap();
        let second = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.payload().as_ref(), b"one");
        assert_eq!(second.payload().as_ref(), b"two");
        assert!(buf.is_empty());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = BytesMut::from(&b"XXzz\x00\x00\x00\x00"[..]);
        assert!(matches!(Frame::decode(&mut buf), Err(WireError::BadMagic)));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&FRAME_MAGIC);
        buf.extend_from_slice(&[99, 0]);
        buf.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(WireError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&FRAME_MAGIC);
        buf.extend_from_slice(&[PROTOCOL_VERSION, 0]);
        buf.extend_from_slice(&((MAX_FRAME_SIZE as u32) + 1).to_le_bytes());
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(WireError::FrameTooLarge(_))
        ));
    }
}
