//! Marshallable types and function signatures
//!
//! Every remotely callable function is described by a [`Signature`]: its
//! return [`ParamType`] and the ordered list of parameter types. The
//! canonical string form of a signature ([`Signature::key`]) is the key used
//! to select a marshal routine on the server.
//!
//! # Canonical form
//!
//! ```text
//! <ret>:<param count>[:<param>]*
//! ```
//!
//! For example `string:2:string:int` for a function taking a string and an
//! int and returning a string, or `int:0` for a function with no parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{Result, SigrpcError};

const KEY_SEPARATOR: char = ':';

/// The fixed set of marshallable kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// No value (return position only)
    Void,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Int64,
    /// UTF-8 string, nullable
    String,
    /// A structured record, encoded as a JSON object of its fields
    Object,
    /// A list of structured records, encoded as a JSON array of objects
    #[serde(rename = "objlist")]
    ObjList,
    /// An arbitrary JSON value passed through untouched
    Json,
}

impl ParamType {
    pub const ALL: [ParamType; 7] = [
        ParamType::Void,
        ParamType::Int,
        ParamType::Int64,
        ParamType::String,
        ParamType::Object,
        ParamType::ObjList,
        ParamType::Json,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Void => "void",
            ParamType::Int => "int",
            ParamType::Int64 => "int64",
            ParamType::String => "string",
            ParamType::Object => "object",
            ParamType::ObjList => "objlist",
            ParamType::Json => "json",
        }
    }

    /// Whether the type may appear in parameter position.
    pub fn is_valid_param(&self) -> bool {
        !matches!(self, ParamType::Void)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamType {
    type Err = SigrpcError;

    fn from_str(s: &str) -> Result<Self> {
        ParamType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SigrpcError::UnknownType(s.to_string()))
    }
}

/// A function's return type and ordered parameter types.
///
/// Signatures are immutable once computed. Two functions with equal
/// signatures are interchangeable for marshalling purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    ret: ParamType,
    params: Vec<ParamType>,
    key: String,
}

impl Signature {
    /// Builds a signature from already-parsed types.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSignature` if `void` appears in parameter position.
    pub fn new(ret: ParamType, params: Vec<ParamType>) -> Result<Self> {
        if let Some(pos) = params.iter().position(|p| !p.is_valid_param()) {
            return Err(SigrpcError::InvalidSignature(format!(
                "parameter {} cannot be of type {}",
                pos + 1,
                params[pos]
            )));
        }

        let key = Self::compute_key(ret, &params);
        Ok(Self { ret, params, key })
    }

    /// Parses a canonical key produced by [`Signature::key`].
    pub fn parse(key: &str) -> Result<Self> {
        let mut parts = key.split(KEY_SEPARATOR);

        let ret = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SigrpcError::InvalidSignature(format!("empty signature '{}'", key)))?
            .parse()?;

        let count: usize = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| SigrpcError::InvalidSignature(format!("missing parameter count in '{}'", key)))?;

        let params = parts.map(str::parse).collect::<Result<Vec<ParamType>>>()?;
        if params.len() != count {
            return Err(SigrpcError::InvalidSignature(format!(
                "'{}' declares {} parameters but lists {}",
                key,
                count,
                params.len()
            )));
        }

        Self::new(ret, params)
    }

    pub fn ret(&self) -> ParamType {
        self.ret
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Canonical string form, used as the dispatch key.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn compute_key(ret: ParamType, params: &[ParamType]) -> String {
        let mut key = format!("{}{}{}", ret, KEY_SEPARATOR, params.len());
        for param in params {
            key.push(KEY_SEPARATOR);
            key.push_str(param.as_str());
        }
        key
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Computes a signature from type names.
///
/// Pure and deterministic. Unknown type names are configuration errors, so
/// this is meant to run while registries are being built, not per call.
///
/// # Example
///
/// ```
/// use sigrpc_common::compute_signature;
///
/// let sig = compute_signature("string", &["string", "int"]).unwrap();
/// assert_eq!(sig.key(), "string:2:string:int");
/// ```
pub fn compute_signature(ret: &str, params: &[&str]) -> Result<Signature> {
    let ret = ret.parse()?;
    let params = params
        .iter()
        .map(|p| p.parse())
        .collect::<Result<Vec<ParamType>>>()?;
    Signature::new(ret, params)
}
