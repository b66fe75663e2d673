//! Call codec: encodes calls and decodes their results.

use serde_json::Value;
use sigrpc_common::transport::JsonCodec;
use sigrpc_common::{FromRpcValue, IntoRpcValue, ParamType, Result, RpcRequest, RpcValue, SigrpcError};

/// Positional call arguments.
///
/// Implemented for tuples of up to six [`IntoRpcValue`] types and for an
/// already built `Vec<Value>`.
pub trait IntoArgs {
    fn into_args(self) -> Result<Vec<Value>>;
}

impl IntoArgs for Vec<Value> {
    fn into_args(self) -> Result<Vec<Value>> {
        Ok(self)
    }
}

macro_rules! impl_into_args {
    ($($ty:ident $var:ident),*) => {
        impl<$($ty: IntoRpcValue,)*> IntoArgs for ($($ty,)*) {
            fn into_args(self) -> Result<Vec<Value>> {
                #[allow(unused_variables)]
                let ($($var,)*) = self;
                Ok(vec![$($var.into_rpc_value()?.into_json()),*])
            }
        }
    };
}

impl_into_args!();
impl_into_args!(A1 a1);
impl_into_args!(A1 a1, A2 a2);
impl_into_args!(A1 a1, A2 a2, A3 a3);
impl_into_args!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_into_args!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_into_args!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);

/// Serializes `[name, args...]`.
pub fn encode_call(name: &str, args: Vec<Value>) -> Result<Vec<u8>> {
    JsonCodec::encode_request(&RpcRequest::new(name, args))
}

/// Extracts the returned value from a response payload.
///
/// # Errors
///
/// - `InvalidResponse` if the payload is not a JSON object
/// - `Rpc { code, message }` if the server answered with an error
pub fn decode_response(payload: &[u8]) -> Result<Value> {
    JsonCodec::decode_response(payload)?.into_result()
}

/// Extracts the returned value and converts it to `T`.
///
/// # Errors
///
/// As [`decode_response`], plus `InvalidResponse` if the value does not fit
/// `T` and `ObjListContainsNull` for an object list with a `null` element.
pub fn decode_result<T: FromRpcValue>(payload: &[u8]) -> Result<T> {
    let value = decode_response(payload)?;

    if T::KIND == ParamType::ObjList {
        if let Value::Array(items) = &value {
            if items.iter().any(Value::is_null) {
                return Err(SigrpcError::ObjListContainsNull);
            }
        }
    }

    let decoded = RpcValue::decode(T::KIND, Some(value))
        .map_err(|e| SigrpcError::InvalidResponse(e.to_string()))?;
    T::from_rpc_value(decoded).map_err(|e| SigrpcError::InvalidResponse(e.to_string()))
}
