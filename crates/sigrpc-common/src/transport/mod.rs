//! Sigrpc Transport Layer
//!
//! This module moves opaque request bytes to a server and brings response
//! bytes back. Callers see a single contract, [`Transport::send`]; the
//! server side only ever sees `(service, request bytes)`.
//!
//! # Architecture
//!
//! - **Framing**: `[4-byte length prefix as u32 big-endian] + [payload]`
//! - **Envelope**: stream transports wrap each request as
//!   `{"service": ..., "request": ...}`
//! - **Codec**: JSON for requests, responses and envelopes
//!
//! # Components
//!
//! - **[`JsonCodec`]**: Encode/decode protocol messages to JSON
//! - **[`frame`]**: Blocking and async frame readers/writers
//! - **[`FramedTransport`]**: Blocking client transport over any [`Connector`]
//! - **[`AsyncFramedTransport`]**: The same over tokio, for [`AsyncConnector`]s
//! - **[`TcpTransport`]** / **[`UnixTransport`]**: The stock connectors
//!
//! # Message Size Limits
//!
//! Frames are limited to 100 MB by default. Zero-length frames are protocol
//! violations.

pub mod async_framed;
pub mod codec;
pub mod frame;
pub mod framed;
pub mod tcp;
#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use async_framed::AsyncUnixTransport;
pub use async_framed::{AsyncConnector, AsyncFramedTransport, AsyncTcpTransport};
pub use codec::JsonCodec;
pub use frame::{read_frame, read_frame_async, write_frame, write_frame_async, DEFAULT_MAX_FRAME_SIZE};
pub use framed::{ConnectionState, Connector, FramedTransport, TransportConfig};
pub use tcp::{TcpConnector, TcpTransport};
#[cfg(unix)]
pub use unix::{UnixConnector, UnixTransport};

use crate::protocol::error::Result;

/// Carries one serialized request to `service` and returns the raw response.
///
/// Implementations are free to connect lazily, reuse connections, or call
/// straight into an in-process registry.
pub trait Transport: Send {
    fn send(&mut self, service: &str, request: &[u8]) -> Result<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, service: &str, request: &[u8]) -> Result<Vec<u8>> {
        (**self).send(service, request)
    }
}
