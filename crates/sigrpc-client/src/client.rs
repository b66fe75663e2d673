use serde_json::Value;
use sigrpc_common::transport::Transport;
use sigrpc_common::{FromRpcValue, Result};
use tracing::debug;

use crate::codec::{decode_response, decode_result, encode_call, IntoArgs};

/// SigRPC client bound to one service over a transport.
///
/// A call blocks until its response arrives and takes `&mut self`, so a
/// client carries one call at a time. Open more clients (and connections)
/// for concurrency. Calls are never retried.
///
/// # Example
///
/// ```no_run
/// use sigrpc_client::RpcClient;
/// use sigrpc_common::transport::TcpTransport;
///
/// let mut client = RpcClient::new(TcpTransport::tcp("127.0.0.1:9090"), "test-rpc");
/// let sum: i32 = client.call("add", (2, 3)).unwrap();
/// assert_eq!(sum, 5);
/// ```
pub struct RpcClient<T: Transport> {
    transport: T,
    service: String,
}

impl<T: Transport> RpcClient<T> {
    pub fn new(transport: T, service: impl Into<String>) -> Self {
        Self {
            transport,
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Targets another service over the same transport.
    pub fn set_service(&mut self, service: impl Into<String>) {
        self.service = service.into();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Calls `function` with raw JSON arguments and returns the raw result.
    pub fn call_raw(&mut self, function: &str, args: Vec<Value>) -> Result<Value> {
        let payload = self.round_trip(function, args)?;
        decode_response(&payload)
    }

    /// Calls `function` and converts the result to `R`.
    ///
    /// # Errors
    ///
    /// - Transport errors (see [`SigrpcError::is_transport`])
    /// - `Rpc { code, message }` when the server answers with an error
    /// - `InvalidResponse` / `ObjListContainsNull` when the answer does not
    ///   decode as `R`
    ///
    /// [`SigrpcError::is_transport`]: sigrpc_common::SigrpcError::is_transport
    pub fn call<R: FromRpcValue>(&mut self, function: &str, args: impl IntoArgs) -> Result<R> {
        let payload = self.round_trip(function, args.into_args()?)?;
        decode_result(&payload)
    }

    fn round_trip(&mut self, function: &str, args: Vec<Value>) -> Result<Vec<u8>> {
        debug!(service = %self.service, function, args = args.len(), "calling");
        let request = encode_call(function, args)?;
        self.transport.send(&self.service, &request)
    }
}
