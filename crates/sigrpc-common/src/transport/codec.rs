use crate::protocol::error::{Result, SigrpcError};
use crate::protocol::{Envelope, RpcRequest, RpcResponse};

/// JSON codec for the messages carried inside frames
///
/// Requests and envelopes that fail to parse are reported as
/// `SigrpcError::Decode`, responses as `SigrpcError::InvalidResponse`, so
/// callers can tell a malformed call from a malformed answer.
///
/// # Example
///
/// ```
/// use sigrpc_common::transport::JsonCodec;
/// use sigrpc_common::protocol::{RpcRequest, RpcResponse};
/// use serde_json::json;
///
/// let request = RpcRequest::new("add", vec![json!(2), json!(3)]);
/// let encoded = JsonCodec::encode_request(&request).unwrap();
/// assert_eq!(encoded, br#"["add",2,3]"#);
///
/// let response = JsonCodec::decode_response(br#"{"ret":5}"#).unwrap();
/// assert_eq!(response, RpcResponse::success(json!(5)));
/// ```
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a request to bytes
    ///
    /// # Arguments
    ///
    /// * `request` - The request to encode
    ///
    /// # Returns
    ///
    /// JSON array `[name, arg...]` as a byte vector
    pub fn encode_request(request: &RpcRequest) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    /// Decode a request from bytes
    ///
    /// # Arguments
    ///
    /// * `data` - The JSON-encoded request
    ///
    /// # Returns
    ///
    /// The decoded request, or `Decode` if `data` is not a JSON array
    /// starting with a string
    pub fn decode_request(data: &[u8]) -> Result<RpcRequest> {
        serde_json::from_slice(data)
            .map_err(|e| SigrpcError::Decode(format!("invalid request: {}", e)))
    }

    /// Encode a response to bytes
    pub fn encode_response(response: &RpcResponse) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    /// Decode a response from bytes
    ///
    /// # Arguments
    ///
    /// * `data` - The JSON-encoded response
    ///
    /// # Returns
    ///
    /// The decoded response, or `InvalidResponse` if `data` is not a JSON
    /// object of the expected shape
    pub fn decode_response(data: &[u8]) -> Result<RpcResponse> {
        serde_json::from_slice(data).map_err(|e| SigrpcError::InvalidResponse(e.to_string()))
    }

    pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(envelope)?)
    }

    pub fn decode_envelope(data: &[u8]) -> Result<Envelope> {
        serde_json::from_slice(data)
            .map_err(|e| SigrpcError::Decode(format!("invalid envelope: {}", e)))
    }
}
