//! Credential handshake and protocol version negotiation.
//!
//! The handshake is the only exchange without a message header. The client
//! writes `user:password`, one byte holding the highest version it speaks,
//! and a terminating zero. The server answers with a single byte carrying
//! its own version, or closes the connection to deny access.
//!
//! [`Handshake`] is a sans-IO state machine: the transport feeds it what it
//! read and writes what it produces.

use crate::error::ProtocolError;
use crate::text::TextEncoding;
use crate::types::Kind;
use std::fmt;

/// Highest protocol version this implementation speaks.
pub const MAX_PROTOCOL_VERSION: u8 = 3;

/// Bytes the server sends back on a successful handshake.
pub const HANDSHAKE_RESPONSE_SIZE: usize = 1;

/// Negotiated protocol version, fixed for the life of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion(u8);

impl ProtocolVersion {
    pub const MAX: ProtocolVersion = ProtocolVersion(MAX_PROTOCOL_VERSION);

    /// Wraps a version number, clamping it to [`MAX_PROTOCOL_VERSION`].
    pub const fn new(version: u8) -> Self {
        if version > MAX_PROTOCOL_VERSION {
            ProtocolVersion(MAX_PROTOCOL_VERSION)
        } else {
            ProtocolVersion(version)
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns whether values of `kind` may be sent at this version.
    pub const fn supports(self, kind: Kind) -> bool {
        self.0 >= kind.required_version()
    }

    /// Fails with [`ProtocolError::VersionUnsupported`] if `kind` is gated
    /// above this version.
    pub fn check(self, kind: Kind) -> Result<(), ProtocolError> {
        if self.supports(kind) {
            Ok(())
        } else {
            Err(ProtocolError::VersionUnsupported {
                kind: kind.name(),
                required: kind.required_version(),
                negotiated: self.0,
            })
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::MAX
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Connected,
    CredentialsSent,
    Negotiated(ProtocolVersion),
    Denied,
}

/// Client side of the handshake.
#[derive(Clone)]
pub struct Handshake {
    user: String,
    password: String,
    max_version: ProtocolVersion,
    state: HandshakeState,
}

impl Handshake {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            max_version: ProtocolVersion::MAX,
            state: HandshakeState::Connected,
        }
    }

    /// Caps the version requested from the server.
    pub fn with_max_version(mut self, version: u8) -> Self {
        self.max_version = ProtocolVersion::new(version);
        self
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The negotiated version, once the handshake has succeeded.
    pub fn version(&self) -> Option<ProtocolVersion> {
        match self.state {
            HandshakeState::Negotiated(v) => Some(v),
            _ => None,
        }
    }

    /// Produces the credential message and moves to `CredentialsSent`.
    pub fn credentials(&mut self, encoding: TextEncoding) -> Result<Vec<u8>, ProtocolError> {
        if self.state != HandshakeState::Connected {
            return Err(ProtocolError::InvalidState("credentials already sent"));
        }
        let login = format!("{}:{}", self.user, self.password);
        let login = encoding.encode_terminated(&login)?;

        let mut msg = Vec::with_capacity(login.len() + 2);
        msg.extend_from_slice(&login);
        msg.push(self.max_version.get());
        msg.push(0);

        self.state = HandshakeState::CredentialsSent;
        Ok(msg)
    }

    /// Consumes the server's reply and negotiates the version.
    ///
    /// An empty reply means the server closed the stream, i.e. denied access.
    pub fn on_response(&mut self, response: &[u8]) -> Result<ProtocolVersion, ProtocolError> {
        if self.state != HandshakeState::CredentialsSent {
            return Err(ProtocolError::InvalidState("no credentials sent"));
        }
        let Some(&offered) = response.first() else {
            return Err(self.on_closed());
        };
        let version = ProtocolVersion::new(offered.min(self.max_version.get()));
        self.state = HandshakeState::Negotiated(version);
        Ok(version)
    }

    /// Records that the stream ended before a reply arrived.
    pub fn on_closed(&mut self) -> ProtocolError {
        self.state = HandshakeState::Denied;
        ProtocolError::AccessDenied
    }
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("max_version", &self.max_version)
            .field("state", &self.state)
            .finish()
    }
}
