//! Sigrpc Common Types and Transport
//!
//! This crate provides the wire types, the signature codec and the framed
//! stream transports shared by the SigRPC server and client.
//!
//! # Overview
//!
//! SigRPC dispatches calls by *signature*: a function is described by its
//! return type and ordered parameter types, and that description selects the
//! routine that decodes arguments and encodes the result. This crate holds
//! everything both sides must agree on:
//!
//! - **Protocol Layer**: [`ParamType`], [`Signature`], [`RpcValue`],
//!   [`RpcRequest`], [`RpcResponse`], [`Envelope`] and error codes
//! - **Transport Layer**: length-prefixed framing over TCP and Unix sockets
//!
//! # Architecture
//!
//! - **Request**: `["function_name", arg1, arg2, ...]`
//! - **Response**: `{"ret": value}` or `{"err_code": n, "err_msg": "..."}`
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Max Message Size**: 100 MB by default
//!
//! # Example
//!
//! ```
//! use sigrpc_common::{compute_signature, RpcRequest, RpcResponse};
//! use serde_json::json;
//!
//! let sig = compute_signature("int", &["int", "int"]).unwrap();
//! assert_eq!(sig.key(), "int:2:int:int");
//!
//! let request = RpcRequest::new("add", vec![json!(2), json!(3)]);
//! assert_eq!(serde_json::to_value(&request).unwrap(), json!(["add", 2, 3]));
//!
//! let response = RpcResponse::success(json!(5));
//! assert_eq!(response.into_result().unwrap(), json!(5));
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
