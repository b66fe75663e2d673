use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::protocol::error::{Result, SigrpcError};
use crate::protocol::Envelope;
use crate::transport::codec::JsonCodec;
use crate::transport::frame::{read_frame_async, write_frame_async};
use crate::transport::framed::{ConnectionState, Connector, TransportConfig};
use crate::transport::tcp::TcpConnector;
#[cfg(unix)]
use crate::transport::unix::UnixConnector;

/// Async framed transport over TCP.
pub type AsyncTcpTransport = AsyncFramedTransport<TcpConnector>;

/// Async framed transport over a Unix domain socket.
#[cfg(unix)]
pub type AsyncUnixTransport = AsyncFramedTransport<UnixConnector>;

/// Opens a tokio byte stream for an [`AsyncFramedTransport`].
pub trait AsyncConnector: Connector + Sync {
    type AsyncStream: AsyncRead + AsyncWrite + Unpin + Send;

    fn connect_async(&self, config: &TransportConfig) -> impl Future<Output = Result<Self::AsyncStream>> + Send;
}

impl AsyncConnector for TcpConnector {
    type AsyncStream = tokio::net::TcpStream;

    /// Resolves the address and tries each result in turn, each bounded by
    /// the connect timeout.
    async fn connect_async(&self, config: &TransportConfig) -> Result<tokio::net::TcpStream> {
        let socket_addrs = tokio::net::lookup_host(self.addr())
            .await
            .map_err(|e| SigrpcError::Connection(format!("Invalid address '{}': {}", self.addr(), e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match tokio::time::timeout(config.connect_timeout, tokio::net::TcpStream::connect(socket_addr)).await {
                Ok(Ok(stream)) => {
                    stream
                        .set_nodelay(true)
                        .map_err(|e| SigrpcError::Connection(format!("Failed to set TCP_NODELAY: {}", e)))?;
                    return Ok(stream);
                }
                Ok(Err(e)) => last_err = Some(e.to_string()),
                Err(_) => last_err = Some(format!("timed out after {:?}", config.connect_timeout)),
            }
        }

        Err(SigrpcError::Connection(format!(
            "Failed to connect to {}: {}",
            self.addr(),
            last_err.unwrap_or_else(|| "Unknown error".to_string())
        )))
    }
}

#[cfg(unix)]
impl AsyncConnector for UnixConnector {
    type AsyncStream = tokio::net::UnixStream;

    async fn connect_async(&self, config: &TransportConfig) -> Result<tokio::net::UnixStream> {
        let connect = tokio::net::UnixStream::connect(self.path());
        match tokio::time::timeout(config.connect_timeout, connect).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(SigrpcError::Connection(format!(
                "Failed to connect to {}: {}",
                self.path().display(),
                e
            ))),
            Err(_) => Err(SigrpcError::Connection(format!(
                "Failed to connect to {}: timed out after {:?}",
                self.path().display(),
                config.connect_timeout
            ))),
        }
    }
}

/// Async counterpart of [`FramedTransport`](crate::transport::FramedTransport).
///
/// Same wire format, envelope and state machine. The configured
/// `io_timeout` bounds each frame write and each frame read, including the
/// wait for the reply to start.
///
/// # Example
///
/// ```no_run
/// use sigrpc_common::transport::AsyncTcpTransport;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut transport = AsyncTcpTransport::tcp("127.0.0.1:9090");
/// let response = transport.send("test-rpc", br#"["add",2,3]"#).await?;
/// assert_eq!(response, br#"{"ret":5}"#);
/// # Ok(())
/// # }
/// ```
pub struct AsyncFramedTransport<C: AsyncConnector> {
    connector: C,
    config: TransportConfig,
    stream: Option<C::AsyncStream>,
    state: ConnectionState,
}

impl<C: AsyncConnector> AsyncFramedTransport<C> {
    pub fn new(connector: C, config: TransportConfig) -> Self {
        Self {
            connector,
            config,
            stream: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    /// Establishes the connection. A no-op when already connected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        match self.connector.connect_async(&self.config).await {
            Ok(stream) => {
                debug!(endpoint = %self.connector.endpoint(), "connected");
                self.stream = Some(stream);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.stream = None;
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        let max = self.config.max_frame_size;
        let limit = self.config.io_timeout;
        let result = match self.stream.as_mut() {
            Some(stream) if self.state == ConnectionState::Connected => {
                within(limit, write_frame_async(stream, payload, max)).await
            }
            _ => return Err(SigrpcError::NotConnected),
        };
        result.map_err(|e| self.fail(e))
    }

    pub async fn receive_frame(&mut self) -> Result<Vec<u8>> {
        let max = self.config.max_frame_size;
        let limit = self.config.io_timeout;
        let result = match self.stream.as_mut() {
            Some(stream) if self.state == ConnectionState::Connected => {
                within(limit, read_frame_async(stream, max, None)).await
            }
            _ => return Err(SigrpcError::NotConnected),
        };
        result.map_err(|e| self.fail(e))
    }

    pub async fn round_trip(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        self.send_frame(payload).await?;
        self.receive_frame().await
    }

    /// Connects if needed, wraps `request` in an envelope for `service` and
    /// returns the reply payload.
    pub async fn send(&mut self, service: &str, request: &[u8]) -> Result<Vec<u8>> {
        if self.state != ConnectionState::Connected {
            self.connect().await?;
        }

        let envelope = JsonCodec::encode_envelope(&Envelope::wrap(service, request)?)?;
        self.round_trip(&envelope).await
    }

    /// Drops the stream. Idempotent.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!(endpoint = %self.connector.endpoint(), "connection closed");
        }
        self.state = ConnectionState::Closed;
    }

    fn fail(&mut self, err: SigrpcError) -> SigrpcError {
        warn!(endpoint = %self.connector.endpoint(), error = %err, "stream failed, closing");
        self.close();
        err
    }
}

impl AsyncFramedTransport<TcpConnector> {
    /// TCP transport with default settings.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self::new(TcpConnector::new(addr), TransportConfig::default())
    }
}

#[cfg(unix)]
impl AsyncFramedTransport<UnixConnector> {
    /// Unix socket transport with default settings.
    pub fn unix(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(UnixConnector::new(path), TransportConfig::default())
    }
}

async fn within<T>(limit: Option<Duration>, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| Err(SigrpcError::Timeout(limit.as_millis() as u64))),
        None => fut.await,
    }
}
