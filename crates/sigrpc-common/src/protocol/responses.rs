//! Call responses
//!
//! A response is a JSON object with exactly one of two shapes:
//!
//! ```text
//! {"ret": <value>}
//! {"err_code": <int>, "err_msg": <string>}
//! ```
//!
//! The presence of `err_code` decides the shape. A success response with no
//! `ret` member carries `null`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::convert::TryFrom;

use super::error::{Result, SigrpcError};

const RET: &str = "ret";
const ERR_CODE: &str = "err_code";
const ERR_MSG: &str = "err_msg";

/// Outcome of a call, as sent back over the wire.
///
/// # Example
///
/// ```
/// use sigrpc_common::protocol::RpcResponse;
/// use serde_json::json;
///
/// let ok = RpcResponse::success(json!(5));
/// assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"ret": 5}));
///
/// let err = RpcResponse::error(500, "Unknown function: nope");
/// assert_eq!(
///     serde_json::to_value(&err).unwrap(),
///     json!({"err_code": 500, "err_msg": "Unknown function: nope"})
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub enum RpcResponse {
    Success { ret: Value },
    Error { code: i32, message: String },
}

impl RpcResponse {
    pub fn success(ret: Value) -> Self {
        RpcResponse::Success { ret }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        RpcResponse::Error {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RpcResponse::Success { .. })
    }

    /// Error code, if this is an error response.
    pub fn code(&self) -> Option<i32> {
        match self {
            RpcResponse::Error { code, .. } => Some(*code),
            RpcResponse::Success { .. } => None,
        }
    }

    /// Converts into the returned value, or `SigrpcError::Rpc` for an error
    /// response.
    pub fn into_result(self) -> Result<Value> {
        match self {
            RpcResponse::Success { ret } => Ok(ret),
            RpcResponse::Error { code, message } => Err(SigrpcError::Rpc { code, message }),
        }
    }
}

impl From<RpcResponse> for Map<String, Value> {
    fn from(response: RpcResponse) -> Self {
        let mut map = Map::new();
        match response {
            RpcResponse::Success { ret } => {
                map.insert(RET.to_string(), ret);
            }
            RpcResponse::Error { code, message } => {
                map.insert(ERR_CODE.to_string(), Value::from(code));
                map.insert(ERR_MSG.to_string(), Value::String(message));
            }
        }
        map
    }
}

impl TryFrom<Map<String, Value>> for RpcResponse {
    type Error = String;

    fn try_from(mut map: Map<String, Value>) -> std::result::Result<Self, String> {
        match map.remove(ERR_CODE) {
            Some(code) => {
                let code = code
                    .as_i64()
                    .and_then(|c| i32::try_from(c).ok())
                    .ok_or_else(|| format!("invalid err_code: {}", code))?;
                let message = match map.remove(ERR_MSG) {
                    Some(Value::String(s)) => s,
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                Ok(RpcResponse::Error { code, message })
            }
            None => Ok(RpcResponse::Success {
                ret: map.remove(RET).unwrap_or(Value::Null),
            }),
        }
    }
}
