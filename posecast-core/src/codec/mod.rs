//! Binary framing for outbound frames.
//!
//! ## Wire format
//!
//! One message per transmitted frame, all fields little-endian:
//!
//! ```text
//! width:        u32  (4)
//! height:       u32  (4)
//! rotation:     u32  (4)   0, 90, 180 or 270
//! payload_len:  u32  (4)   == width * height * 3 / 2
//! payload:      [u8] (payload_len)
//! ```
//!
//! There is no delimiter or escaping: a receiver reads the 16-byte
//! header and then exactly `payload_len` bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::PosecastError;
use crate::frame::{PackedFrame, Rotation};

/// Upper bound on a single frame message, header included.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

// ── FrameHeader ──────────────────────────────────────────────────

/// Geometry metadata that precedes every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 16;

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.width.to_le_bytes());
        buf[4..8].copy_from_slice(&self.height.to_le_bytes());
        buf[8..12].copy_from_slice(&self.rotation.degrees().to_le_bytes());
        buf[12..16].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    /// Deserialize from bytes, validating rotation, frame size and
    /// payload length.
    pub fn decode(data: &[u8]) -> Result<Self, PosecastError> {
        if data.len() < Self::SIZE {
            return Err(PosecastError::HeaderTooShort(data.len()));
        }
        let field = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);

        let header = Self {
            width: field(0),
            height: field(4),
            rotation: Rotation::try_from(field(8))?,
            payload_len: field(12),
        };

        let expected = PackedFrame::checked_len(header.width, header.height)
            .filter(|&len| len <= MAX_FRAME_SIZE - Self::SIZE)
            .ok_or(PosecastError::FrameTooLarge {
                size: PackedFrame::expected_len(header.width, header.height)
                    .saturating_add(Self::SIZE),
                max: MAX_FRAME_SIZE,
            })?;
        if header.payload_len as usize != expected {
            return Err(PosecastError::PayloadLengthMismatch {
                width: header.width,
                height: header.height,
                expected,
                actual: header.payload_len as usize,
            });
        }
        Ok(header)
    }

    /// Header plus payload size.
    pub fn message_len(&self) -> usize {
        Self::SIZE + self.payload_len as usize
    }
}

// ── FrameMessage ─────────────────────────────────────────────────

/// The unit placed on the wire: header followed by the packed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMessage {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl FrameMessage {
    /// Wrap an already-transformed frame. `rotation` is the rotation
    /// that was applied to produce it.
    pub fn new(frame: PackedFrame, rotation: Rotation) -> Self {
        let header = FrameHeader {
            width: frame.width(),
            height: frame.height(),
            rotation,
            payload_len: frame.byte_len() as u32,
        };
        Self {
            header,
            payload: Bytes::from(frame.into_bytes()),
        }
    }

    /// Serialize header and payload into one contiguous buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.header.message_len());
        buf.put_slice(&self.header.encode());
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

// ── FrameCodec ───────────────────────────────────────────────────

/// `tokio_util` codec for [`FrameMessage`] streams.
///
/// Encoding cannot fail for messages built by [`FrameMessage::new`];
/// decoding validates every header before touching the payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Encoder<FrameMessage> for FrameCodec {
    type Error = PosecastError;

    fn encode(&mut self, item: FrameMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.payload.len() != item.header.payload_len as usize {
            return Err(PosecastError::SizeMismatch {
                expected: item.header.payload_len as usize,
                actual: item.payload.len(),
            });
        }
        dst.reserve(item.header.message_len());
        dst.put_slice(&item.header.encode());
        dst.put_slice(&item.payload);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = FrameMessage;
    type Error = PosecastError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FrameHeader::SIZE {
            return Ok(None);
        }

        let header = FrameHeader::decode(&src[..FrameHeader::SIZE])?;
        let total = header.message_len();
        if total > MAX_FRAME_SIZE {
            return Err(PosecastError::FrameTooLarge {
                size: total,
                max: MAX_FRAME_SIZE,
            });
        }
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut message = src.split_to(total);
        message.advance(FrameHeader::SIZE);
        Ok(Some(FrameMessage {
            header,
            payload: message.freeze(),
        }))
    }
}

// ── Tests ────────────────────────────────────────────────────────
