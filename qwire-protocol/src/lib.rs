//! # qwire-protocol
//!
//! Wire protocol implementation for the q/kdb+ IPC format.
//!
//! This crate provides:
//! - The 8-byte message header and frame splitting
//! - A closed value model (atoms, vectors, lists, dictionaries, tables)
//! - A two-pass payload encoder and a bounds-checked decoder
//! - The credential handshake and protocol version negotiation
//! - Error types and error classification
//!
//! It performs no I/O; see `qwire-client` for a connection over tokio.

pub mod codec;
pub mod error;
pub mod handshake;
pub mod header;
pub mod temporal;
pub mod text;
pub mod types;
pub mod value;

pub use codec::{Decoder, Encoder};
pub use error::{ErrorKind, ProtocolError};
pub use handshake::{
    Handshake, HandshakeState, ProtocolVersion, HANDSHAKE_RESPONSE_SIZE, MAX_PROTOCOL_VERSION,
};
pub use header::{ByteOrder, Frame, MessageHeader, MessageKind, HEADER_SIZE, MAX_MESSAGE_SIZE};
pub use temporal::{Minute, Month, Second, Timespan};
pub use text::TextEncoding;
pub use types::{FunctionKind, Kind, TypeTag};
pub use value::{Atom, Dict, Table, Value, Vector};

/// Default port of a q process.
pub const DEFAULT_PORT: u16 = 5000;

/// Total message size above which a message is eligible for compression.
pub const COMPRESSION_THRESHOLD: usize = 2000;
