use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use tracing::{debug, warn};

use crate::protocol::error::{Result, SigrpcError};
use crate::protocol::Envelope;
use crate::transport::codec::JsonCodec;
use crate::transport::frame::{self, DEFAULT_MAX_FRAME_SIZE};
use crate::transport::Transport;

/// Default timeout for establishing a connection (5 seconds)
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for a single read or write (30 seconds)
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Client-side stream settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    /// Applies to each blocking read and write. `None` waits forever.
    pub io_timeout: Option<Duration>,
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: Some(DEFAULT_IO_TIMEOUT),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl TransportConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }
}

/// Lifecycle of a stream transport.
///
/// ```text
/// Disconnected -> Connecting -> Connected -> Closed
///                     |                        |
///                     +--(failure)--> Disconnected
/// ```
///
/// A closed transport may be reconnected with [`FramedTransport::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// Opens the underlying byte stream for a [`FramedTransport`].
pub trait Connector: Send {
    type Stream: Read + Write + Send;

    fn connect(&self, config: &TransportConfig) -> Result<Self::Stream>;

    /// Human-readable endpoint, for logs and errors.
    fn endpoint(&self) -> String;
}

/// A blocking, length-framed stream transport.
///
/// Requests sent through the [`Transport`] trait are wrapped in an
/// [`Envelope`] naming the target service. The transport connects lazily on
/// first use. Any I/O failure drops the stream and moves it to
/// [`ConnectionState::Closed`]; the next call reconnects.
///
/// # Example
///
/// ```no_run
/// use sigrpc_common::transport::{TcpTransport, Transport};
///
/// let mut transport = TcpTransport::tcp("127.0.0.1:9090");
/// let response = transport.send("test-rpc", br#"["add",2,3]"#).unwrap();
/// assert_eq!(response, br#"{"ret":5}"#);
/// ```
pub struct FramedTransport<C: Connector> {
    connector: C,
    config: TransportConfig,
    stream: Option<C::Stream>,
    state: ConnectionState,
}

impl<C: Connector> FramedTransport<C> {
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
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the endpoint is unreachable; the transport is
    /// left `Disconnected`.
    pub fn connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        match self.connector.connect(&self.config) {
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

    /// Writes one frame.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` unless the transport is `Connected`.
    pub fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        let max = self.config.max_frame_size;
        let result = match self.stream.as_mut() {
            Some(stream) if self.state == ConnectionState::Connected => {
                frame::write_frame(stream, payload, max)
            }
            _ => return Err(SigrpcError::NotConnected),
        };
        result.map_err(|e| self.fail(e))
    }

    /// Reads one frame, blocking up to the configured I/O timeout.
    pub fn receive_frame(&mut self) -> Result<Vec<u8>> {
        let max = self.config.max_frame_size;
        let result = match self.stream.as_mut() {
            Some(stream) if self.state == ConnectionState::Connected => frame::read_frame(stream, max),
            _ => return Err(SigrpcError::NotConnected),
        };
        result.map_err(|e| self.fail(e))
    }

    /// Sends one frame and waits for the reply frame.
    pub fn round_trip(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        self.send_frame(payload)?;
        self.receive_frame()
    }

    /// Drops the stream. Idempotent.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!(endpoint = %self.connector.endpoint(), "connection closed");
        }
        self.state = ConnectionState::Closed;
    }

    /// Tears the connection down after a failed read or write and converts
    /// timeouts to `Timeout`.
    fn fail(&mut self, err: SigrpcError) -> SigrpcError {
        warn!(endpoint = %self.connector.endpoint(), error = %err, "stream failed, closing");
        self.close();

        match err {
            SigrpcError::Io(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                let ms = self.config.io_timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
                SigrpcError::Timeout(ms)
            }
            other => other,
        }
    }
}

impl<C: Connector> Transport for FramedTransport<C> {
    fn send(&mut self, service: &str, request: &[u8]) -> Result<Vec<u8>> {
        if self.state != ConnectionState::Connected {
            self.connect()?;
        }

        let envelope = JsonCodec::encode_envelope(&Envelope::wrap(service, request)?)?;
        self.round_trip(&envelope)
    }
}

impl<C: Connector> Drop for FramedTransport<C> {
    fn drop(&mut self) {
        self.close();
    }
}
