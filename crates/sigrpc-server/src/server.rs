use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;
use std::sync::Arc;

use sigrpc_common::protocol::error::{INVALID_REQUEST, RESPONSE_TOO_LARGE};
use sigrpc_common::transport::{read_frame_async, write_frame_async, JsonCodec};
use sigrpc_common::{Result, RpcResponse, SigrpcError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::registry::{self, FunctionRegistry};

/// Where a server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`; port 0 picks a free port.
    Tcp(String),
    /// Filesystem path of a Unix domain socket.
    #[cfg(unix)]
    Unix(PathBuf),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
}

enum Accepted {
    Tcp(TcpStream, SocketAddr),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Listener {
    async fn accept(&self) -> std::io::Result<Accepted> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                // Small request/response frames; don't wait on Nagle.
                stream.set_nodelay(true)?;
                Ok(Accepted::Tcp(stream, peer))
            }
            #[cfg(unix)]
            Listener::Unix(listener, _) => {
                let (stream, _) = listener.accept().await?;
                Ok(Accepted::Unix(stream))
            }
        }
    }
}

/// Serves a [`FunctionRegistry`] over a stream socket.
///
/// Every accepted connection gets its own task, which answers one request
/// at a time until the peer disconnects. The registered functions are
/// synchronous and run on tokio's blocking pool, so a slow function never
/// stalls the accept loop or other connections.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use sigrpc_server::{Endpoint, FunctionRegistry, RpcServer, ServerConfig, ServiceError};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut registry = FunctionRegistry::with_default_marshals()?;
/// registry.create_service("test-rpc");
/// registry.register_function("test-rpc", "add", |a: i32, b: i32| -> Result<i32, ServiceError> {
///     Ok(a + b)
/// })?;
///
/// let server = RpcServer::bind(
///     Endpoint::Tcp("127.0.0.1:9090".into()),
///     Arc::new(registry),
///     ServerConfig::default(),
/// )
/// .await?;
/// server.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct RpcServer {
    listener: Listener,
    local: Endpoint,
    registry: Arc<FunctionRegistry>,
    config: Arc<ServerConfig>,
    limiter: Option<Arc<Semaphore>>,
}

impl RpcServer {
    /// Binds the endpoint.
    ///
    /// For Unix endpoints a leftover socket file at the path is removed
    /// first, and the new socket is restricted to its owner (`0700`).
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the endpoint cannot be bound.
    pub async fn bind(
        endpoint: Endpoint,
        registry: Arc<FunctionRegistry>,
        config: ServerConfig,
    ) -> Result<Self> {
        let (listener, local) = match endpoint {
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(&addr)
                    .await
                    .map_err(|e| SigrpcError::Connection(format!("Failed to bind to {}: {}", addr, e)))?;
                let bound = listener
                    .local_addr()
                    .map_err(|e| SigrpcError::Connection(format!("Failed to get local addr: {}", e)))?;
                (Listener::Tcp(listener), Endpoint::Tcp(bound.to_string()))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let listener = bind_unix(&path)?;
                (Listener::Unix(listener, path.clone()), Endpoint::Unix(path))
            }
        };

        let limiter = config.max_connections.map(|n| Arc::new(Semaphore::new(n)));
        info!(endpoint = %local, max_connections = ?config.max_connections, "server listening");

        Ok(Self {
            listener,
            local,
            registry,
            config: Arc::new(config),
            limiter,
        })
    }

    /// The bound endpoint, with the actual port for `Tcp` endpoints.
    pub fn local_addr(&self) -> &Endpoint {
        &self.local
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Serves until the process exits.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` completes. Connections already being served
    /// keep running in their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let permit = match &self.limiter {
                Some(limiter) => tokio::select! {
                    _ = &mut shutdown => break,
                    permit = limiter.clone().acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                },
                None => None,
            };

            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok(Accepted::Tcp(stream, peer)) => {
                    self.spawn_handler(stream, peer.to_string(), permit);
                }
                #[cfg(unix)]
                Ok(Accepted::Unix(stream)) => {
                    self.spawn_handler(stream, "unix".to_string(), permit);
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                }
            }
        }

        info!(endpoint = %self.local, "server stopped accepting");
        Ok(())
    }

    fn spawn_handler<S>(&self, stream: S, peer: String, permit: Option<OwnedSemaphorePermit>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        debug!(%peer, "connection established");
        let registry = self.registry.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            handle_connection(stream, &peer, registry, config).await;
            drop(permit);
        });
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Listener::Unix(_, path) = &self.listener {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(unix)]
fn bind_unix(path: &std::path::Path) -> Result<UnixListener> {
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};

    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if !meta.file_type().is_socket() {
            return Err(SigrpcError::Connection(format!(
                "Refusing to replace non-socket file {}",
                path.display()
            )));
        }
        std::fs::remove_file(path).map_err(|e| {
            SigrpcError::Connection(format!("Failed to remove stale socket {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "removed stale socket");
    }

    let listener = UnixListener::bind(path)
        .map_err(|e| SigrpcError::Connection(format!("Failed to bind to {}: {}", path.display(), e)))?;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).map_err(|e| {
        SigrpcError::Connection(format!("Failed to set permissions on {}: {}", path.display(), e))
    })?;

    Ok(listener)
}

/// Serves one connection until the peer hangs up or a frame error occurs.
///
/// Undecodable envelopes are answered with `INVALID_REQUEST` and responses
/// over the frame limit with `RESPONSE_TOO_LARGE`; the connection stays
/// open in both cases. Frame errors, and reads or writes that overrun
/// `frame_timeout`, close only this connection.
pub(crate) async fn handle_connection<S>(
    mut stream: S,
    peer: &str,
    registry: Arc<FunctionRegistry>,
    config: Arc<ServerConfig>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let payload = match read_frame_async(&mut stream, config.max_frame_size, config.frame_timeout).await {
            Ok(payload) => payload,
            Err(SigrpcError::ConnectionClosed) => {
                debug!(peer, "connection closed by peer");
                return;
            }
            Err(e) => {
                warn!(peer, error = %e, "closing connection");
                return;
            }
        };

        let response = match JsonCodec::decode_envelope(&payload) {
            Ok(envelope) => {
                let registry = registry.clone();
                let call = tokio::task::spawn_blocking(move || {
                    registry.call_function(&envelope.service, envelope.request.as_bytes())
                });
                match call.await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!(peer, error = %e, "call task failed");
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(peer, error = %e, "malformed envelope");
                registry::encode(RpcResponse::error(INVALID_REQUEST, e.to_string()))
            }
        };

        let response = if response.len() > config.max_frame_size {
            warn!(peer, size = response.len(), max = config.max_frame_size, "response exceeds frame limit");
            registry::encode(RpcResponse::error(
                RESPONSE_TOO_LARGE,
                format!("response of {} bytes exceeds {}", response.len(), config.max_frame_size),
            ))
        } else {
            response
        };

        let write = write_frame_async(&mut stream, &response, config.max_frame_size);
        let written = match config.frame_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .unwrap_or_else(|_| Err(SigrpcError::Timeout(limit.as_millis() as u64))),
            None => write.await,
        };
        if let Err(e) = written {
            warn!(peer, error = %e, "failed to send response");
            return;
        }
    }
}
