//! Server configuration.
//!
//! Limits applied by the server loop to every connection it serves.

use std::time::Duration;

use sigrpc_common::transport::DEFAULT_MAX_FRAME_SIZE;
use tracing::warn;

pub const ENV_MAX_FRAME_SIZE: &str = "SIGRPC_MAX_FRAME_SIZE";
pub const ENV_FRAME_TIMEOUT_MS: &str = "SIGRPC_FRAME_TIMEOUT_MS";
pub const ENV_MAX_CONNECTIONS: &str = "SIGRPC_MAX_CONNECTIONS";

/// Server loop limits.
///
/// # Fields
///
/// - `max_frame_size` - Largest accepted frame payload (default: 100 MB)
/// - `frame_timeout` - Time allowed for the rest of a frame to arrive once
///   its first byte has been read, and for a response frame to be written
///   (default: none)
/// - `max_connections` - Connections served at once; further connections
///   wait for a slot (default: unbounded)
///
/// # Example
///
/// ```
/// use sigrpc_server::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::new()
///     .with_frame_timeout(Duration::from_secs(10))
///     .with_max_connections(64);
/// assert_eq!(config.max_connections, Some(64));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub max_frame_size: usize,
    pub frame_timeout: Option<Duration>,
    pub max_connections: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            frame_timeout: None,
            max_connections: None,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = Some(timeout);
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Defaults overlaid with `SIGRPC_MAX_FRAME_SIZE`,
    /// `SIGRPC_FRAME_TIMEOUT_MS` and `SIGRPC_MAX_CONNECTIONS`.
    ///
    /// Unparsable or zero values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = parse_positive(&lookup, ENV_MAX_FRAME_SIZE) {
            config.max_frame_size = v;
        }
        if let Some(v) = parse_positive(&lookup, ENV_FRAME_TIMEOUT_MS) {
            config.frame_timeout = Some(Duration::from_millis(v as u64));
        }
        if let Some(v) = parse_positive(&lookup, ENV_MAX_CONNECTIONS) {
            config.max_connections = Some(v);
        }

        config
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = lookup(key)?;
    match raw.trim().parse::<usize>() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            warn!(key, value = %raw, "ignoring invalid setting");
            None
        }
    }
}
