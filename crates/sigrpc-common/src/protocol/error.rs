use thiserror::Error;

/// Requested function is not registered in the service.
pub const FUNCTION_NOT_FOUND: i32 = 500;
/// Requested service does not exist.
pub const SERVICE_NOT_FOUND: i32 = 501;
/// Response payload is not a JSON object.
pub const INVALID_RESPONSE_DATA: i32 = 502;
/// An object list in a response contains a `null` element.
pub const OBJLIST_CONTAINS_NULL: i32 = 503;
/// Request (or envelope) could not be parsed.
pub const INVALID_REQUEST: i32 = 511;
/// An argument did not match its declared parameter type.
pub const ARGUMENT_DECODE_FAILED: i32 = 512;
/// The invoked function panicked.
pub const FUNCTION_PANICKED: i32 = 513;
/// The invoked function returned a value of the wrong kind.
pub const RETURN_KIND_MISMATCH: i32 = 514;
/// The encoded response exceeds the server's frame size limit.
pub const RESPONSE_TOO_LARGE: i32 = 515;

#[derive(Error, Debug)]
pub enum SigrpcError {
    // Configuration errors: raised while building registries at startup.
    #[error("Unknown type name: {0}")]
    UnknownType(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Duplicate marshal routine for signature {0}")]
    DuplicateMarshal(String),

    #[error("No marshal routine registered for signature {0}")]
    UnknownSignature(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Function {function} already registered in service {service}")]
    DuplicateFunction { service: String, function: String },

    // Decode errors: resolved into error responses on the server.
    #[error("Decode error: {0}")]
    Decode(String),

    // Transport errors.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Transport is not connected")]
    NotConnected,

    // Application and client decoding errors.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Object list in response contains null")]
    ObjListContainsNull,

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

impl SigrpcError {
    /// True when the call did not get an answer at all, as opposed to the
    /// server answering with an error.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SigrpcError::Connection(_)
                | SigrpcError::ConnectionClosed
                | SigrpcError::Timeout(_)
                | SigrpcError::Io(_)
                | SigrpcError::FrameTooLarge { .. }
                | SigrpcError::EmptyFrame
                | SigrpcError::NotConnected
        )
    }

    /// True for errors that can only be raised while wiring up registries.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SigrpcError::UnknownType(_)
                | SigrpcError::InvalidSignature(_)
                | SigrpcError::DuplicateMarshal(_)
                | SigrpcError::UnknownSignature(_)
                | SigrpcError::ServiceNotFound(_)
                | SigrpcError::DuplicateFunction { .. }
        )
    }

    /// Application-level error code, when the server answered with one.
    pub fn rpc_code(&self) -> Option<i32> {
        match self {
            SigrpcError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Numeric code for errors that have one, including the client-side
    /// response decoding failures.
    pub fn error_code(&self) -> Option<i32> {
        match self {
            SigrpcError::Rpc { code, .. } => Some(*code),
            SigrpcError::InvalidResponse(_) => Some(INVALID_RESPONSE_DATA),
            SigrpcError::ObjListContainsNull => Some(OBJLIST_CONTAINS_NULL),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SigrpcError>;
