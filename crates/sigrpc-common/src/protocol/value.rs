//! Typed values at the JSON decode boundary
//!
//! Arguments arrive as loosely typed JSON. They are converted eagerly into an
//! [`RpcValue`] according to the declared [`ParamType`] before any function is
//! invoked, and then into concrete Rust types through [`FromRpcValue`].
//! Results travel the opposite way through [`IntoRpcValue`].
//!
//! # Type Mapping
//!
//! | ParamType | Rust types                        | JSON                          |
//! |-----------|-----------------------------------|-------------------------------|
//! | void      | `()`                              | `null`                        |
//! | int       | `i32`                             | number (`null`/absent → `-1`) |
//! | int64     | `i64`                             | number (`null`/absent → `-1`) |
//! | string    | `String`, `Option<String>`, `&str`| string or `null`              |
//! | object    | [`Object<T>`]                     | object or `null`              |
//! | objlist   | [`ObjList<T>`]                    | array of objects              |
//! | json      | `serde_json::Value`               | any                           |
//!
//! The `-1` sentinel for missing numeric arguments is intentional: it lets
//! callers omit optional trailing integer arguments.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::error::{Result, SigrpcError};
use super::types::ParamType;

/// Value substituted for an absent or `null` numeric argument.
pub const NUMERIC_SENTINEL: i64 = -1;

/// A value already checked against its declared [`ParamType`].
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    Void,
    Int(i32),
    Int64(i64),
    String(Option<String>),
    Object(Option<Map<String, Value>>),
    ObjList(Vec<Map<String, Value>>),
    Json(Value),
}

impl RpcValue {
    pub fn kind(&self) -> ParamType {
        match self {
            RpcValue::Void => ParamType::Void,
            RpcValue::Int(_) => ParamType::Int,
            RpcValue::Int64(_) => ParamType::Int64,
            RpcValue::String(_) => ParamType::String,
            RpcValue::Object(_) => ParamType::Object,
            RpcValue::ObjList(_) => ParamType::ObjList,
            RpcValue::Json(_) => ParamType::Json,
        }
    }

    /// Decodes a JSON value (or its absence) as the given kind.
    ///
    /// # Errors
    ///
    /// Returns `SigrpcError::Decode` when the JSON value does not fit the
    /// kind, e.g. a string where an int is expected, a fractional or
    /// out-of-range number, or an object list containing `null`.
    pub fn decode(kind: ParamType, value: Option<Value>) -> Result<Self> {
        let value = value.unwrap_or(Value::Null);

        match kind {
            ParamType::Void => Ok(RpcValue::Void),
            ParamType::Int => match value {
                Value::Null => Ok(RpcValue::Int(NUMERIC_SENTINEL as i32)),
                Value::Number(n) => n
                    .as_i64()
                    .and_then(|i| i32::try_from(i).ok())
                    .map(RpcValue::Int)
                    .ok_or_else(|| SigrpcError::Decode(format!("{} is not a valid int", n))),
                other => Err(unexpected(kind, &other)),
            },
            ParamType::Int64 => match value {
                Value::Null => Ok(RpcValue::Int64(NUMERIC_SENTINEL)),
                Value::Number(n) => n
                    .as_i64()
                    .map(RpcValue::Int64)
                    .ok_or_else(|| SigrpcError::Decode(format!("{} is not a valid int64", n))),
                other => Err(unexpected(kind, &other)),
            },
            ParamType::String => match value {
                Value::Null => Ok(RpcValue::String(None)),
                Value::String(s) => Ok(RpcValue::String(Some(s))),
                other => Err(unexpected(kind, &other)),
            },
            ParamType::Object => match value {
                Value::Null => Ok(RpcValue::Object(None)),
                Value::Object(map) => Ok(RpcValue::Object(Some(map))),
                other => Err(unexpected(kind, &other)),
            },
            ParamType::ObjList => match value {
                Value::Null => Ok(RpcValue::ObjList(Vec::new())),
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| match item {
                        Value::Object(map) => Ok(map),
                        Value::Null => Err(SigrpcError::Decode(format!(
                            "object list contains null at index {}",
                            i
                        ))),
                        other => Err(SigrpcError::Decode(format!(
                            "object list element {} is {}, expected object",
                            i,
                            json_kind(&other)
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(RpcValue::ObjList),
                other => Err(unexpected(kind, &other)),
            },
            ParamType::Json => Ok(RpcValue::Json(value)),
        }
    }

    /// Encodes the value into its JSON wire form.
    pub fn into_json(self) -> Value {
        match self {
            RpcValue::Void => Value::Null,
            RpcValue::Int(i) => Value::from(i),
            RpcValue::Int64(i) => Value::from(i),
            RpcValue::String(s) => s.map(Value::String).unwrap_or(Value::Null),
            RpcValue::Object(map) => map.map(Value::Object).unwrap_or(Value::Null),
            RpcValue::ObjList(items) => Value::Array(items.into_iter().map(Value::Object).collect()),
            RpcValue::Json(v) => v,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn unexpected(kind: ParamType, got: &Value) -> SigrpcError {
    SigrpcError::Decode(format!("expected {}, got {}", kind, json_kind(got)))
}

fn kind_mismatch(expected: ParamType, got: &RpcValue) -> SigrpcError {
    SigrpcError::Decode(format!("expected {} value, got {}", expected, got.kind()))
}

/// Rust types that can be produced from a decoded [`RpcValue`].
pub trait FromRpcValue: Sized {
    const KIND: ParamType;

    fn from_rpc_value(value: RpcValue) -> Result<Self>;
}

/// Rust types that can be encoded as an [`RpcValue`].
pub trait IntoRpcValue {
    const KIND: ParamType;

    fn into_rpc_value(self) -> Result<RpcValue>;
}

impl FromRpcValue for () {
    const KIND: ParamType = ParamType::Void;

    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        match value {
            RpcValue::Void => Ok(()),
            other => Err(kind_mismatch(<Self as FromRpcValue>::KIND, &other)),
        }
    }
}

impl IntoRpcValue for () {
    const KIND: ParamType = ParamType::Void;

    fn into_rpc_value(self) -> Result<RpcValue> {
        Ok(RpcValue::Void)
    }
}

impl FromRpcValue for i32 {
    const KIND: ParamType = ParamType::Int;

    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        match value {
            RpcValue::Int(i) => Ok(i),
            other => Err(kind_mismatch(<Self as FromRpcValue>::KIND, &other)),
        }
    }
}

impl IntoRpcValue for i32 {
    const KIND: ParamType = ParamType::Int;

    fn into_rpc_value(self) -> Result<RpcValue> {
        Ok(RpcValue::Int(self))
    }
}

impl FromRpcValue for i64 {
    const KIND: ParamType = ParamType::Int64;

    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        match value {
            RpcValue::Int64(i) => Ok(i),
            other => Err(kind_mismatch(<Self as FromRpcValue>::KIND, &other)),
        }
    }
}

impl IntoRpcValue for i64 {
    const KIND: ParamType = ParamType::Int64;

    fn into_rpc_value(self) -> Result<RpcValue> {
        Ok(RpcValue::Int64(self))
    }
}

impl FromRpcValue for Option<String> {
    const KIND: ParamType = ParamType::String;

    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        match value {
            RpcValue::String(s) => Ok(s),
            other => Err(kind_mismatch(<Self as FromRpcValue>::KIND, &other)),
        }
    }
}

impl IntoRpcValue for Option<String> {
    const KIND: ParamType = ParamType::String;

    fn into_rpc_value(self) -> Result<RpcValue> {
        Ok(RpcValue::String(self))
    }
}

/// Non-nullable string. A `null` fails to decode; use `Option<String>` to
/// accept it.
impl FromRpcValue for String {
    const KIND: ParamType = ParamType::String;

    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        match value {
            RpcValue::String(Some(s)) => Ok(s),
            RpcValue::String(None) => Err(SigrpcError::Decode("expected string, got null".into())),
            other => Err(kind_mismatch(<Self as FromRpcValue>::KIND, &other)),
        }
    }
}

impl IntoRpcValue for String {
    const KIND: ParamType = ParamType::String;

    fn into_rpc_value(self) -> Result<RpcValue> {
        Ok(RpcValue::String(Some(self)))
    }
}

impl IntoRpcValue for &str {
    const KIND: ParamType = ParamType::String;

    fn into_rpc_value(self) -> Result<RpcValue> {
        Ok(RpcValue::String(Some(self.to_string())))
    }
}

impl FromRpcValue for Value {
    const KIND: ParamType = ParamType::Json;

    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        match value {
            RpcValue::Json(v) => Ok(v),
            other => Err(kind_mismatch(<Self as FromRpcValue>::KIND, &other)),
        }
    }
}

impl IntoRpcValue for Value {
    const KIND: ParamType = ParamType::Json;

    fn into_rpc_value(self) -> Result<RpcValue> {
        Ok(RpcValue::Json(self))
    }
}

/// A single structured record of handle type `T`, or nothing.
///
/// `T` is flattened into a JSON object of its fields. With plain `Option`
/// fields, absent values are sent as `null` so every object carries the
/// full declared field set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object<T>(pub Option<T>);

impl<T> Object<T> {
    pub fn some(value: T) -> Self {
        Object(Some(value))
    }

    pub fn none() -> Self {
        Object(None)
    }

    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

impl<T> Default for Object<T> {
    fn default() -> Self {
        Object(None)
    }
}

impl<T> From<T> for Object<T> {
    fn from(value: T) -> Self {
        Object(Some(value))
    }
}

/// A list of structured records of handle type `T`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjList<T>(pub Vec<T>);

impl<T> ObjList<T> {
    pub fn into_inner(self) -> Vec<T> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for ObjList<T> {
    fn default() -> Self {
        ObjList(Vec::new())
    }
}

impl<T> From<Vec<T>> for ObjList<T> {
    fn from(items: Vec<T>) -> Self {
        ObjList(items)
    }
}

fn to_property_map<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(SigrpcError::Decode(format!(
            "handle type serialized to {}, expected an object",
            json_kind(&other)
        ))),
    }
}

fn from_property_map<T: DeserializeOwned>(map: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(map))
        .map_err(|e| SigrpcError::Decode(format!("invalid object fields: {}", e)))
}

impl<T: DeserializeOwned> FromRpcValue for Object<T> {
    const KIND: ParamType = ParamType::Object;

    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        match value {
            RpcValue::Object(None) => Ok(Object(None)),
            RpcValue::Object(Some(map)) => from_property_map(map).map(|v| Object(Some(v))),
            other => Err(kind_mismatch(<Self as FromRpcValue>::KIND, &other)),
        }
    }
}

impl<T: Serialize> IntoRpcValue for Object<T> {
    const KIND: ParamType = ParamType::Object;

    fn into_rpc_value(self) -> Result<RpcValue> {
        let map = self.0.as_ref().map(to_property_map).transpose()?;
        Ok(RpcValue::Object(map))
    }
}

impl<T: DeserializeOwned> FromRpcValue for ObjList<T> {
    const KIND: ParamType = ParamType::ObjList;

    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        match value {
            RpcValue::ObjList(items) => items
                .into_iter()
                .map(from_property_map)
                .collect::<Result<Vec<T>>>()
                .map(ObjList),
            other => Err(kind_mismatch(<Self as FromRpcValue>::KIND, &other)),
        }
    }
}

impl<T: Serialize> IntoRpcValue for ObjList<T> {
    const KIND: ParamType = ParamType::ObjList;

    fn into_rpc_value(self) -> Result<RpcValue> {
        self.0
            .iter()
            .map(to_property_map)
            .collect::<Result<Vec<_>>>()
            .map(RpcValue::ObjList)
    }
}
