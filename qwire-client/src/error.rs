//! Client error types.

use qwire_protocol::{ErrorKind, ProtocolError};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("access denied")]
    AccessDenied,

    #[error("server error: {message}")]
    ServerError { message: String },

    #[error("unexpected {0:?} message while awaiting a response")]
    UnexpectedMessage(qwire_protocol::MessageKind),
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Remote(message) => ClientError::ServerError { message },
            ProtocolError::AccessDenied => ClientError::AccessDenied,
            ProtocolError::Io(e) => ClientError::Io(e),
            other => ClientError::Protocol(other),
        }
    }
}

impl ClientError {
    /// Returns whether the request may be retried, possibly on a new
    /// connection.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionClosed => true,
            _ => false,
        }
    }

    /// Returns whether the connection that produced this error must be
    /// discarded.
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            ClientError::Protocol(e) => e.kind().is_connection_fatal(),
            ClientError::ServerError { .. } => false,
            _ => true,
        }
    }

    /// Protocol classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Protocol(e) => e.kind(),
            ClientError::ServerError { .. } => ErrorKind::Remote,
            ClientError::AccessDenied => ErrorKind::Auth,
            ClientError::UnexpectedMessage(_) => ErrorKind::Protocol,
            ClientError::ConnectionClosed => ErrorKind::Truncated,
            ClientError::Io(_)
            | ClientError::NotConnected
            | ClientError::Timeout => ErrorKind::Io,
        }
    }
}
