//! Message header and framing.
//!
//! Every message after the handshake starts with a fixed 8-byte header:
//!
//! ```text
//! +--------+------+------------+----------+-------------------------+
//! | endian | kind | compressed | reserved | total length (i32)      |
//! | 1 byte |1 byte|   1 byte   |  1 byte  | 4 bytes, order of byte 0|
//! +--------+------+------------+----------+-------------------------+
//! | payload: total length - 8 bytes                                 |
//! +-----------------------------------------------------------------+
//! ```
//!
//! The total length counts the header itself. Byte 0 is `1` for
//! little-endian messages and `0` for big-endian ones, and applies to the
//! length field as well as every numeric field of the payload.

use crate::error::ProtocolError;
use bytes::{Buf, Bytes, BytesMut};

/// Size of the fixed message header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Largest total length the signed 32-bit length field can declare.
pub const MAX_MESSAGE_SIZE: usize = i32::MAX as usize;

/// Byte order declared by a message header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

impl ByteOrder {
    /// The order of the machine running this code.
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }

    fn from_flag(flag: u8) -> Self {
        if flag == 0 {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    fn flag(self) -> u8 {
        match self {
            ByteOrder::Big => 0,
            ByteOrder::Little => 1,
        }
    }
}

/// Message kind carried in header byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Fire-and-forget; the peer sends no reply.
    Async = 0,
    /// Request expecting exactly one response.
    Sync = 1,
    Response = 2,
}

impl MessageKind {
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(MessageKind::Async),
            1 => Ok(MessageKind::Sync),
            2 => Ok(MessageKind::Response),
            other => Err(ProtocolError::UnknownMessageKind(other)),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A view over the first [`HEADER_SIZE`] bytes of some storage.
///
/// Accessors read straight from the underlying bytes, so the same type works
/// over a receive buffer slice, an owned array, or the front of a send
/// buffer being finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader<B> {
    buf: B,
}

impl<B: AsRef<[u8]>> MessageHeader<B> {
    /// Wraps `buf`, which must hold at least [`HEADER_SIZE`] bytes.
    pub fn new(buf: B) -> Result<Self, ProtocolError> {
        let remaining = buf.as_ref().len();
        if remaining < HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                needed: HEADER_SIZE,
                remaining,
            });
        }
        Ok(Self { buf })
    }

    fn bytes(&self) -> &[u8] {
        &self.buf.as_ref()[..HEADER_SIZE]
    }

    pub fn byte_order(&self) -> ByteOrder {
        ByteOrder::from_flag(self.bytes()[0])
    }

    /// Decodes the message kind. An unknown code means the stream is foreign
    /// or corrupt.
    pub fn kind(&self) -> Result<MessageKind, ProtocolError> {
        MessageKind::from_code(self.bytes()[1])
    }

    pub fn is_compressed(&self) -> bool {
        self.bytes()[2] != 0
    }

    /// Total message length, header included, as declared on the wire.
    pub fn length(&self) -> i32 {
        let raw = [self.bytes()[4], self.bytes()[5], self.bytes()[6], self.bytes()[7]];
        match self.byte_order() {
            ByteOrder::Big => i32::from_be_bytes(raw),
            ByteOrder::Little => i32::from_le_bytes(raw),
        }
    }

    /// Number of payload bytes following the header.
    pub fn payload_len(&self) -> Result<usize, ProtocolError> {
        let length = self.length();
        usize::try_from(length)
            .ok()
            .and_then(|l| l.checked_sub(HEADER_SIZE))
            .ok_or(ProtocolError::InvalidLength(length))
    }

    /// Copies the header bytes out of the underlying storage.
    pub fn copied(&self) -> MessageHeader<[u8; HEADER_SIZE]> {
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(self.bytes());
        MessageHeader { buf: raw }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> MessageHeader<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf.as_mut()[..HEADER_SIZE]
    }

    /// Sets the byte order flag. Call before [`set_length`](Self::set_length),
    /// which writes in the current order.
    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.bytes_mut()[0] = order.flag();
    }

    pub fn set_kind(&mut self, kind: MessageKind) {
        self.bytes_mut()[1] = kind.code();
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        self.bytes_mut()[2] = u8::from(compressed);
        self.bytes_mut()[3] = 0;
    }

    pub fn set_length(&mut self, length: i32) {
        let raw = match self.byte_order() {
            ByteOrder::Big => length.to_be_bytes(),
            ByteOrder::Little => length.to_le_bytes(),
        };
        self.bytes_mut()[4..8].copy_from_slice(&raw);
    }
}

impl MessageHeader<[u8; HEADER_SIZE]> {
    /// Builds an owned header.
    pub fn build(order: ByteOrder, kind: MessageKind, compressed: bool, length: i32) -> Self {
        let mut header = MessageHeader {
            buf: [0u8; HEADER_SIZE],
        };
        header.set_byte_order(order);
        header.set_kind(kind);
        header.set_compressed(compressed);
        header.set_length(length);
        header
    }

    pub fn as_bytes(&self) -> &[u8; HEADER_SIZE] {
        &self.buf
    }
}

/// One complete message split off a receive buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: MessageHeader<[u8; HEADER_SIZE]>,
    pub kind: MessageKind,
    pub payload: Bytes,
}

impl Frame {
    /// Decodes a frame from the front of `buf`.
    ///
    /// Returns `Ok(Some(frame))` if a complete message was consumed,
    /// `Ok(None)` if more data is needed, or `Err` if the header is invalid.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Peek at header without consuming
        let header = MessageHeader::new(&buf[..HEADER_SIZE])?.copied();
        let kind = header.kind()?;
        let payload_len = header.payload_len()?;

        if buf.len() < HEADER_SIZE + payload_len {
            return Ok(None);
        }

        buf.advance(HEADER_SIZE);
        let payload = buf.split_to(payload_len).freeze();

        Ok(Some(Self {
            header,
            kind,
            payload,
        }))
    }
}
