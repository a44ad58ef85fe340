//! Protocol error types and error classification.

use crate::types::FunctionKind;
use std::fmt;
use thiserror::Error;

/// Errors raised while framing, encoding or decoding IPC messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown type tag: {0}")]
    UnknownTypeTag(i8),

    #[error("unknown message kind: {0}")]
    UnknownMessageKind(u8),

    #[error("truncated message: need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("remote error: {0}")]
    Remote(String),

    #[error("access denied")]
    AccessDenied,

    #[error("{kind} requires protocol version {required}, negotiated {negotiated}")]
    VersionUnsupported {
        kind: &'static str,
        required: u8,
        negotiated: u8,
    },

    #[error("message of {size} bytes needs compression, which is not supported")]
    CompressionUnsupported { size: usize },

    #[error("text encoding error: {0}")]
    Encoding(String),

    #[error("{kind} value out of range: {reason}")]
    OutOfRange { kind: &'static str, reason: String },

    #[error("malformed table: {0}")]
    InvalidTable(&'static str),

    #[error("length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("{0:?} values cannot be encoded")]
    Unencodable(FunctionKind),

    #[error("values nested deeper than {max} levels")]
    NestingTooDeep { max: usize },

    #[error("negative element count: {0}")]
    NegativeCount(i32),

    #[error("invalid message length: {0}")]
    InvalidLength(i32),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("invalid handshake state: {0}")]
    InvalidState(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`ProtocolError`].
///
/// The kind decides whether the connection that produced the error may be
/// used for further requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed frame: unknown tag, unknown message kind, bad table shape.
    Protocol,
    /// The server answered with an error atom.
    Remote,
    /// The handshake was refused.
    Auth,
    /// A value needs a newer protocol version than the one negotiated.
    Version,
    /// A feature the codec does not implement (compression, function values).
    Unsupported,
    /// Text or temporal value could not be represented.
    Encoding,
    /// The stream ended before a declared length was satisfied.
    Truncated,
    /// Transport failure.
    Io,
}

impl ErrorKind {
    /// Returns whether the connection must be discarded after this error.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::Protocol | ErrorKind::Auth | ErrorKind::Truncated | ErrorKind::Io
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Protocol => write!(f, "PROTOCOL"),
            ErrorKind::Remote => write!(f, "REMOTE"),
            ErrorKind::Auth => write!(f, "AUTH"),
            ErrorKind::Version => write!(f, "VERSION"),
            ErrorKind::Unsupported => write!(f, "UNSUPPORTED"),
            ErrorKind::Encoding => write!(f, "ENCODING"),
            ErrorKind::Truncated => write!(f, "TRUNCATED"),
            ErrorKind::Io => write!(f, "IO"),
        }
    }
}

impl ProtocolError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::UnknownTypeTag(_)
            | ProtocolError::UnknownMessageKind(_)
            | ProtocolError::InvalidTable(_)
            | ProtocolError::NegativeCount(_)
            | ProtocolError::NestingTooDeep { .. }
            | ProtocolError::InvalidLength(_)
            | ProtocolError::MessageTooLarge { .. }
            | ProtocolError::InvalidState(_) => ErrorKind::Protocol,
            ProtocolError::Truncated { .. } => ErrorKind::Truncated,
            ProtocolError::Remote(_) => ErrorKind::Remote,
            ProtocolError::AccessDenied => ErrorKind::Auth,
            ProtocolError::VersionUnsupported { .. } => ErrorKind::Version,
            ProtocolError::CompressionUnsupported { .. } | ProtocolError::Unencodable(_) => {
                ErrorKind::Unsupported
            }
            ProtocolError::Encoding(_)
            | ProtocolError::OutOfRange { .. }
            | ProtocolError::LengthMismatch { .. } => ErrorKind::Encoding,
            ProtocolError::Io(_) => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_fatality() {
        // Connection must be dropped
        assert!(ErrorKind::Protocol.is_connection_fatal());
        assert!(ErrorKind::Auth.is_connection_fatal());
        assert!(ErrorKind::Truncated.is_connection_fatal());
        assert!(ErrorKind::Io.is_connection_fatal());

        // Connection stays usable
        assert!(!ErrorKind::Remote.is_connection_fatal());
        assert!(!ErrorKind::Version.is_connection_fatal());
        assert!(!ErrorKind::Unsupported.is_connection_fatal());
        assert!(!ErrorKind::Encoding.is_connection_fatal());
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(format!("{}", ErrorKind::Protocol), "PROTOCOL");
        assert_eq!(format!("{}", ErrorKind::Remote), "REMOTE");
        assert_eq!(format!("{}", ErrorKind::Auth), "AUTH");
        assert_eq!(format!("{}", ErrorKind::Version), "VERSION");
        assert_eq!(format!("{}", ErrorKind::Unsupported), "UNSUPPORTED");
        assert_eq!(format!("{}", ErrorKind::Encoding), "ENCODING");
        assert_eq!(format!("{}", ErrorKind::Truncated), "TRUNCATED");
        assert_eq!(format!("{}", ErrorKind::Io), "IO");
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(ProtocolError::UnknownTypeTag(42).kind(), ErrorKind::Protocol);
        assert_eq!(
            ProtocolError::UnknownMessageKind(7).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(
            ProtocolError::Remote("type".into()).kind(),
            ErrorKind::Remote
        );
        assert_eq!(ProtocolError::AccessDenied.kind(), ErrorKind::Auth);
        assert_eq!(
            ProtocolError::VersionUnsupported {
                kind: "guid",
                required: 3,
                negotiated: 2
            }
            .kind(),
            ErrorKind::Version
        );
        assert_eq!(
            ProtocolError::CompressionUnsupported { size: 4096 }.kind(),
            ErrorKind::Unsupported
        );
        assert_eq!(
            ProtocolError::Encoding("bad".into()).kind(),
            ErrorKind::Encoding
        );
        assert_eq!(
            ProtocolError::Truncated {
                needed: 8,
                remaining: 2
            }
            .kind(),
            ErrorKind::Truncated
        );
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnknownTypeTag(-42);
        assert!(err.to_string().contains("-42"));

        let err = ProtocolError::Truncated {
            needed: 16,
            remaining: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("16") && msg.contains('3'));

        let err = ProtocolError::Remote("rank".into());
        assert!(err.to_string().contains("rank"));

        let err = ProtocolError::VersionUnsupported {
            kind: "guid",
            required: 3,
            negotiated: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("guid") && msg.contains('3') && msg.contains('2'));

        let err = ProtocolError::Unencodable(FunctionKind::Lambda);
        assert!(err.to_string().contains("Lambda"));

        let err = ProtocolError::AccessDenied;
        assert_eq!(err.to_string(), "access denied");
    }
}
