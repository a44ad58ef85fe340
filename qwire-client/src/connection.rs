//! Connection management.

use crate::error::ClientError;
use bytes::BytesMut;
use qwire_protocol::{
    Decoder, Encoder, Frame, Handshake, MessageKind, ProtocolVersion, TextEncoding, Value,
    HANDSHAKE_RESPONSE_SIZE, HEADER_SIZE, MAX_PROTOCOL_VERSION,
};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default message buffer capacity (8 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum message buffer capacity (1 KiB).
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Maximum initial message buffer capacity (64 MiB). The buffer still grows
/// past this for larger messages.
pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Connection configuration.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Server address as `host:port`.
    pub addr: String,
    pub user: String,
    pub password: String,
    /// Highest protocol version to request.
    pub max_version: u8,
    /// Encoding of symbols and character vectors.
    pub encoding: TextEncoding,
    /// Consider compression for large messages to non-loopback peers.
    pub compression: bool,
    /// Initial capacity of the message buffer.
    pub buffer_size: usize,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Per-exchange timeout. `None` waits indefinitely on a stalled peer.
    pub request_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            user: String::new(),
            password: String::new(),
            max_version: MAX_PROTOCOL_VERSION,
            encoding: TextEncoding::default(),
            compression: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_max_version(mut self, version: u8) -> Self {
        self.max_version = version.min(MAX_PROTOCOL_VERSION);
        self
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("addr", &self.addr)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("max_version", &self.max_version)
            .field("encoding", &self.encoding)
            .field("compression", &self.compression)
            .field("buffer_size", &self.buffer_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Runs `fut` under an optional timeout.
async fn timed<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, ClientError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ClientError::Timeout)?,
        None => fut.await,
    }
}

/// A handshaken connection to a q process.
///
/// One request is in flight at a time: every exchange borrows the
/// connection mutably and reads the full reply before returning. Requests
/// are built in a reusable write buffer; the read buffer keeps any bytes
/// received past the end of a reply for the next read.
pub struct Connection<S = TcpStream> {
    stream: S,
    read_buf: BytesMut,
    write_buf: BytesMut,
    encoder: Encoder,
    decoder: Decoder,
    request_timeout: Option<Duration>,
    buffer_size: usize,
    closed: bool,
}

impl Connection<TcpStream> {
    /// Opens a TCP connection and performs the handshake.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        tracing::debug!("Connecting to {}...", config.addr);

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&config.addr))
            .await
            .map_err(|_| {
                tracing::debug!("Connection timeout");
                ClientError::Timeout
            })?
            .map_err(|e| {
                tracing::debug!("Connection failed: {}", e);
                ClientError::Io(e)
            })?;

        stream.set_nodelay(true).ok();
        let loopback = stream
            .peer_addr()
            .map(|addr| addr.ip().is_loopback())
            .unwrap_or(false);
        tracing::debug!(loopback, "TCP connected");

        Self::establish(stream, config, !loopback).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Performs the handshake over an already open stream.
    ///
    /// The peer is treated as remote for the compression rule.
    pub async fn with_stream(stream: S, config: ConnectionConfig) -> Result<Self, ClientError> {
        Self::establish(stream, config, true).await
    }

    async fn establish(
        mut stream: S,
        config: ConnectionConfig,
        remote: bool,
    ) -> Result<Self, ClientError> {
        let timeout = config.request_timeout;
        let version = timed(timeout, Self::handshake(&mut stream, &config)).await?;
        tracing::debug!(%version, "Handshake complete");

        let encoder = Encoder::new(version)
            .with_encoding(config.encoding)
            .with_compression(config.compression && remote);

        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(config.buffer_size),
            write_buf: BytesMut::with_capacity(config.buffer_size),
            encoder,
            decoder: Decoder::new(config.encoding),
            request_timeout: config.request_timeout,
            buffer_size: config.buffer_size,
            closed: false,
        })
    }

    async fn handshake(
        stream: &mut S,
        config: &ConnectionConfig,
    ) -> Result<ProtocolVersion, ClientError> {
        let mut handshake = Handshake::new(config.user.as_str(), config.password.as_str())
            .with_max_version(config.max_version);

        let credentials = handshake.credentials(config.encoding)?;
        tracing::debug!(user = %config.user, "Sending credentials");
        stream.write_all(&credentials).await?;
        stream.flush().await?;

        let mut response = [0u8; HANDSHAKE_RESPONSE_SIZE];
        let n = match stream.read(&mut response).await {
            Ok(n) => n,
            // Some servers reset rather than close on denial.
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => 0,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            tracing::warn!(user = %config.user, "Access denied");
        }
        Ok(handshake.on_response(&response[..n])?)
    }

    /// Negotiated protocol version.
    pub fn version(&self) -> ProtocolVersion {
        self.encoder.version()
    }

    /// Returns whether the connection can still be used.
    pub fn is_connected(&self) -> bool {
        !self.closed
    }

    /// Sends `value` as a sync message and waits for its response.
    pub async fn sync_request(&mut self, value: &Value) -> Result<Value, ClientError> {
        let result = timed(self.request_timeout, async {
            self.send(MessageKind::Sync, value).await?;
            let frame = self.read_frame().await?;
            if frame.kind != MessageKind::Response {
                return Err(ClientError::UnexpectedMessage(frame.kind));
            }
            let value = self.decoder.decode_message(&frame.header, &frame.payload)?;
            Ok::<_, ClientError>(value)
        })
        .await;
        self.check(result)
    }

    /// Sends `value` as an async message. No reply is expected.
    pub async fn async_message(&mut self, value: &Value) -> Result<(), ClientError> {
        let result = timed(self.request_timeout, self.send(MessageKind::Async, value)).await;
        self.check(result)
    }

    /// Waits for the next message from the peer, of any kind.
    pub async fn read_message(&mut self) -> Result<(MessageKind, Value), ClientError> {
        let result = async {
            let frame = self.read_frame().await?;
            let value = self.decoder.decode_message(&frame.header, &frame.payload)?;
            Ok::<_, ClientError>((frame.kind, value))
        }
        .await;
        self.check(result)
    }

    /// Closes the connection.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        tracing::debug!("Closing connection...");
        self.closed = true;
        self.read_buf.clear();
        self.write_buf.clear();
        self.stream.shutdown().await?;
        tracing::debug!("Connection closed");
        Ok(())
    }

    /// Marks the connection closed if `result` carries a fatal error.
    fn check<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(e) = &result {
            if e.is_connection_fatal() && !self.closed {
                tracing::warn!(error = %e, "Discarding connection");
                self.closed = true;
            }
        }
        result
    }

    async fn send(&mut self, kind: MessageKind, value: &Value) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::NotConnected);
        }
        self.encoder
            .encode_message(kind, value, &mut self.write_buf)?;
        tracing::debug!(?kind, bytes = self.write_buf.len(), "Sending message");

        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        self.write_buf.clear();
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame, ClientError> {
        if self.closed {
            return Err(ClientError::NotConnected);
        }
        loop {
            if let Some(frame) = Frame::decode(&mut self.read_buf)? {
                tracing::debug!(
                    kind = ?frame.kind,
                    bytes = HEADER_SIZE + frame.payload.len(),
                    "Received message"
                );
                return Ok(frame);
            }

            // Size the next read from the header once it is available.
            let wanted = match qwire_protocol::MessageHeader::new(&self.read_buf[..]) {
                Ok(header) => header.payload_len()? + HEADER_SIZE - self.read_buf.len(),
                Err(_) => self.buffer_size,
            };
            self.read_buf.reserve(wanted);

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                tracing::debug!(buffered = self.read_buf.len(), "Connection closed by peer");
                return Err(ClientError::ConnectionClosed);
            }
        }
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("version", &self.encoder.version())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
