use serde::{Deserialize, Serialize};

use super::error::{Result, SigrpcError};

/// Routes a serialized request to a named service.
///
/// Only stream transports wrap requests in an envelope; the in-process
/// transport passes the service name directly.
///
/// ```text
/// {"service": "test-rpc", "request": "[\"add\",2,3]"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub service: String,
    /// The serialized request, carried as a string.
    pub request: String,
}

impl Envelope {
    /// Wraps raw request bytes for `service`.
    ///
    /// # Errors
    ///
    /// Returns `SigrpcError::Decode` if the request is not valid UTF-8.
    pub fn wrap(service: impl Into<String>, request: &[u8]) -> Result<Self> {
        let request = std::str::from_utf8(request)
            .map_err(|e| SigrpcError::Decode(format!("request is not valid UTF-8: {}", e)))?;

        Ok(Envelope {
            service: service.into(),
            request: request.to_string(),
        })
    }
}
