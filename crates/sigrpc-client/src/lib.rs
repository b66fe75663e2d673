//! SigRPC Client
//!
//! Encodes calls, sends them over any [`Transport`] and decodes the typed
//! results. [`RpcClient`] blocks; [`AsyncRpcClient`] runs on tokio.
//!
//! [`Transport`]: sigrpc_common::transport::Transport

pub mod async_client;
pub mod client;
pub mod codec;

pub use async_client::AsyncRpcClient;
pub use client::RpcClient;
pub use codec::{decode_response, decode_result, encode_call, IntoArgs};
