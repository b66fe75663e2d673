use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use crate::protocol::error::{Result, SigrpcError};
use crate::transport::framed::{Connector, FramedTransport, TransportConfig};

/// Framed transport over a Unix domain socket.
pub type UnixTransport = FramedTransport<UnixConnector>;

#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
}

impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for UnixConnector {
    type Stream = UnixStream;

    fn connect(&self, config: &TransportConfig) -> Result<UnixStream> {
        let stream = UnixStream::connect(&self.path).map_err(|e| {
            SigrpcError::Connection(format!("Failed to connect to {}: {}", self.path.display(), e))
        })?;

        stream
            .set_read_timeout(config.io_timeout)
            .map_err(|e| SigrpcError::Connection(format!("Failed to set read timeout: {}", e)))?;
        stream
            .set_write_timeout(config.io_timeout)
            .map_err(|e| SigrpcError::Connection(format!("Failed to set write timeout: {}", e)))?;

        Ok(stream)
    }

    fn endpoint(&self) -> String {
        format!("unix://{}", self.path.display())
    }
}

impl FramedTransport<UnixConnector> {
    /// Unix socket transport with default settings.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::new(UnixConnector::new(path), TransportConfig::default())
    }
}
