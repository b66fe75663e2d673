//! SigRPC Server
//!
//! This crate provides the server half of SigRPC: the marshal routines keyed
//! by function signature, the registry of services and functions, and the
//! server loop that answers framed requests over TCP or Unix sockets.
//!
//! # Components
//!
//! - [`MarshalRegistry`] - decode-invoke-encode routines keyed by signature
//! - [`FunctionRegistry`] - services, their functions, and `call_function`
//! - [`RpcServer`] - accept loop with one task per connection
//! - [`LocalTransport`] - calls a registry in-process

pub mod config;
pub mod invoke;
pub mod local;
pub mod marshal;
pub mod registry;
pub mod server;

pub use config::ServerConfig;
pub use invoke::{IntoInvocable, Invocable, InvokeError, ServiceError};
pub use local::LocalTransport;
pub use marshal::{generic_marshal, MarshalEntry, MarshalFn, MarshalRegistry, DEFAULT_TABLE};
pub use registry::{FunctionRegistry, RegisteredFunction, Service};
pub use server::{Endpoint, RpcServer};
