//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use qwire_protocol::{ProtocolVersion, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// High-level client for a q process.
///
/// Expressions are sent as character vectors and evaluated by the server.
#[derive(Debug)]
pub struct Client<S = TcpStream> {
    conn: Connection<S>,
}

impl Client<TcpStream> {
    /// Connects and performs the handshake.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        Ok(Self {
            conn: Connection::connect(config).await?,
        })
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S> {
    /// Handshakes over an already open stream.
    pub async fn with_stream(stream: S, config: ConnectionConfig) -> Result<Self, ClientError> {
        Ok(Self {
            conn: Connection::with_stream(stream, config).await?,
        })
    }

    /// Wraps an established connection.
    pub fn from_connection(conn: Connection<S>) -> Self {
        Self { conn }
    }

    /// Negotiated protocol version.
    pub fn version(&self) -> ProtocolVersion {
        self.conn.version()
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Closes the connection.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Returns the underlying connection.
    pub fn connection(&mut self) -> &mut Connection<S> {
        &mut self.conn
    }

    /// Evaluates `expr` on the server and returns the result.
    pub async fn query(&mut self, expr: &str) -> Result<Value, ClientError> {
        tracing::debug!(expr, "query");
        self.conn.sync_request(&Value::chars(expr)).await
    }

    /// Applies `function` to `args` on the server.
    ///
    /// Sent as the general list `(function; arg0; arg1; ...)`, where
    /// `function` is a name or a lambda source such as `{x+y}`.
    pub async fn call<I>(&mut self, function: &str, args: I) -> Result<Value, ClientError>
    where
        I: IntoIterator<Item = Value>,
    {
        let request = Value::List(
            std::iter::once(Value::chars(function))
                .chain(args)
                .collect(),
        );
        tracing::debug!(function, args = request.count() - 1, "call");
        self.conn.sync_request(&request).await
    }

    /// Sends `expr` for evaluation without waiting for a result.
    pub async fn send_async(&mut self, expr: &str) -> Result<(), ClientError> {
        self.conn.async_message(&Value::chars(expr)).await
    }

    /// Sends an arbitrary value as a sync request.
    pub async fn request(&mut self, value: &Value) -> Result<Value, ClientError> {
        self.conn.sync_request(value).await
    }
}
