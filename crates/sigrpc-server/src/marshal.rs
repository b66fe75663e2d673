//! Signature-keyed marshal routines
//!
//! A marshal routine turns positional JSON arguments into typed values,
//! invokes the target and encodes its result. Routines are looked up by the
//! canonical [`Signature`] key, so every function sharing a signature
//! shares a routine.
//!
//! The registry is filled during startup and read-only afterwards.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use sigrpc_common::protocol::error::{
    ARGUMENT_DECODE_FAILED, FUNCTION_NOT_FOUND, FUNCTION_PANICKED, RETURN_KIND_MISMATCH,
};
use sigrpc_common::{Result, RpcResponse, RpcValue, Signature, SigrpcError};
use tracing::{debug, error};

use crate::invoke::Invocable;

/// Decodes arguments, invokes the target, encodes the result.
///
/// Never fails: every problem becomes an error response.
pub type MarshalFn = fn(&Signature, &dyn Invocable, Vec<Value>) -> RpcResponse;

/// Signatures registered by [`MarshalRegistry::with_defaults`].
///
/// Covers the routines every deployment has used so far; applications
/// register additional signatures with [`MarshalRegistry::register_generic`].
pub const DEFAULT_TABLE: &[(&str, &[&str])] = &[
    ("int", &[]),
    ("int", &["string"]),
    ("int", &["string", "string"]),
    ("int", &["int", "int"]),
    ("int64", &[]),
    ("int64", &["string"]),
    ("string", &[]),
    ("string", &["string"]),
    ("string", &["string", "int"]),
    ("object", &[]),
    ("object", &["string"]),
    ("objlist", &[]),
    ("objlist", &["string"]),
    ("objlist", &["int", "int"]),
    ("objlist", &["string", "int"]),
    ("objlist", &["string", "int", "int"]),
    ("objlist", &["string", "string", "int"]),
    ("json", &[]),
    ("json", &["string", "int"]),
    ("json", &["json"]),
    ("void", &["json"]),
];

/// A routine together with the signature it was registered for.
#[derive(Clone)]
pub struct MarshalEntry {
    pub signature: Signature,
    pub marshal: MarshalFn,
}

#[derive(Clone, Default)]
pub struct MarshalRegistry {
    entries: HashMap<String, MarshalEntry>,
}

impl MarshalRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry with the generic routine for every entry of
    /// `table`, given as `(return type, parameter types)` names.
    ///
    /// # Errors
    ///
    /// Fails on unknown type names and on duplicate entries.
    pub fn from_table(table: &[(&str, &[&str])]) -> Result<Self> {
        let mut registry = Self::new();
        for (ret, params) in table {
            let signature = sigrpc_common::compute_signature(ret, params)?;
            registry.register_generic(signature)?;
        }
        Ok(registry)
    }

    /// Builds a registry from [`DEFAULT_TABLE`].
    pub fn with_defaults() -> Result<Self> {
        Self::from_table(DEFAULT_TABLE)
    }

    /// Registers `marshal` for `signature`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateMarshal` if the signature already has a routine.
    pub fn register(&mut self, signature: Signature, marshal: MarshalFn) -> Result<()> {
        let key = signature.key().to_string();
        if self.entries.contains_key(&key) {
            return Err(SigrpcError::DuplicateMarshal(key));
        }

        debug!(signature = %key, "marshal registered");
        self.entries.insert(key, MarshalEntry { signature, marshal });
        Ok(())
    }

    /// Registers the built-in [`generic_marshal`] routine for `signature`.
    pub fn register_generic(&mut self, signature: Signature) -> Result<()> {
        self.register(signature, generic_marshal)
    }

    /// Resolves the routine for `signature`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSignature` if nothing is registered for it.
    pub fn lookup(&self, signature: &Signature) -> Result<&MarshalEntry> {
        self.entries
            .get(signature.key())
            .ok_or_else(|| SigrpcError::UnknownSignature(signature.key().to_string()))
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.entries.contains_key(signature.key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered signatures, in no particular order.
    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.entries.values().map(|e| &e.signature)
    }

    /// Runs the routine registered for `signature` against `target`.
    pub fn dispatch(&self, signature: &Signature, args: Vec<Value>, target: &dyn Invocable) -> RpcResponse {
        match self.lookup(signature) {
            Ok(entry) => (entry.marshal)(signature, target, args),
            Err(e) => RpcResponse::error(FUNCTION_NOT_FOUND, e.to_string()),
        }
    }
}

/// The decode-invoke-encode routine shared by all signatures.
///
/// - Arguments are decoded positionally per the signature's parameter types.
///   Missing arguments decode as absent, surplus ones are ignored.
/// - A decode failure answers `ARGUMENT_DECODE_FAILED` without invoking.
/// - A panic inside the target answers `FUNCTION_PANICKED`.
/// - A value of the wrong kind answers `RETURN_KIND_MISMATCH`.
pub fn generic_marshal(signature: &Signature, target: &dyn Invocable, args: Vec<Value>) -> RpcResponse {
    let mut raw = args.into_iter();
    let mut values = Vec::with_capacity(signature.arity());

    for (i, kind) in signature.params().iter().enumerate() {
        match RpcValue::decode(*kind, raw.next()) {
            Ok(value) => values.push(value),
            Err(e) => {
                return RpcResponse::error(ARGUMENT_DECODE_FAILED, format!("argument {}: {}", i + 1, e));
            }
        }
    }

    let ret = match panic::catch_unwind(AssertUnwindSafe(|| target.invoke(values))) {
        Ok(Ok(ret)) => ret,
        Ok(Err(e)) => return e.into_response(),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(signature = %signature, panic = %message, "function panicked");
            return RpcResponse::error(FUNCTION_PANICKED, format!("function panicked: {}", message));
        }
    };

    if ret.kind() != signature.ret() {
        return RpcResponse::error(
            RETURN_KIND_MISMATCH,
            format!("declared return type {}, got {}", signature.ret(), ret.kind()),
        );
    }

    RpcResponse::success(ret.into_json())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
