use std::net::{TcpStream, ToSocketAddrs};

use crate::protocol::error::{Result, SigrpcError};
use crate::transport::framed::{Connector, FramedTransport, TransportConfig};

/// Framed transport over TCP.
pub type TcpTransport = FramedTransport<TcpConnector>;

/// Connects to a TCP endpoint such as `"127.0.0.1:9090"`.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    /// Resolves the address (which may resolve to multiple addresses) and
    /// tries each until one succeeds.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if:
    /// - The address cannot be parsed
    /// - Connection fails to all resolved addresses
    /// - Timeouts cannot be set on the stream
    fn connect(&self, config: &TransportConfig) -> Result<TcpStream> {
        let socket_addrs = self
            .addr
            .to_socket_addrs()
            .map_err(|e| SigrpcError::Connection(format!("Invalid address '{}': {}", self.addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect_timeout(&socket_addr, config.connect_timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(config.io_timeout)
                        .map_err(|e| SigrpcError::Connection(format!("Failed to set read timeout: {}", e)))?;
                    stream
                        .set_write_timeout(config.io_timeout)
                        .map_err(|e| SigrpcError::Connection(format!("Failed to set write timeout: {}", e)))?;
                    // Small request/response frames; don't wait on Nagle.
                    stream
                        .set_nodelay(true)
                        .map_err(|e| SigrpcError::Connection(format!("Failed to set TCP_NODELAY: {}", e)))?;

                    return Ok(stream);
                }
                Err(e) => {
                    last_err = Some(e);
                }
            }
        }

        Err(SigrpcError::Connection(format!(
            "Failed to connect to {}: {}",
            self.addr,
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "Unknown error".to_string())
        )))
    }

    fn endpoint(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

impl FramedTransport<TcpConnector> {
    /// TCP transport with default settings.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self::new(TcpConnector::new(addr), TransportConfig::default())
    }
}
