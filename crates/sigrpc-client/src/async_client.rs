use serde_json::Value;
use sigrpc_common::transport::{AsyncConnector, AsyncFramedTransport};
use sigrpc_common::{FromRpcValue, Result};
use tracing::debug;

use crate::codec::{decode_response, decode_result, encode_call, IntoArgs};

/// Async flavor of [`RpcClient`](crate::RpcClient).
///
/// Same calls, same errors; the round trip awaits instead of blocking. One
/// call is in flight per client.
///
/// # Example
///
/// ```no_run
/// use sigrpc_client::AsyncRpcClient;
/// use sigrpc_common::transport::AsyncTcpTransport;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut client = AsyncRpcClient::new(AsyncTcpTransport::tcp("127.0.0.1:9090"), "test-rpc");
/// let sum: i32 = client.call("add", (2, 3)).await?;
/// assert_eq!(sum, 5);
/// # Ok(())
/// # }
/// ```
pub struct AsyncRpcClient<C: AsyncConnector> {
    transport: AsyncFramedTransport<C>,
    service: String,
}

impl<C: AsyncConnector> AsyncRpcClient<C> {
    pub fn new(transport: AsyncFramedTransport<C>, service: impl Into<String>) -> Self {
        Self {
            transport,
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn set_service(&mut self, service: impl Into<String>) {
        self.service = service.into();
    }

    pub fn transport(&self) -> &AsyncFramedTransport<C> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut AsyncFramedTransport<C> {
        &mut self.transport
    }

    pub async fn call_raw(&mut self, function: &str, args: Vec<Value>) -> Result<Value> {
        let payload = self.round_trip(function, args).await?;
        decode_response(&payload)
    }

    /// Calls `function` and converts the result to `R`. Errors as
    /// [`RpcClient::call`](crate::RpcClient::call).
    pub async fn call<R: FromRpcValue>(&mut self, function: &str, args: impl IntoArgs) -> Result<R> {
        let args = args.into_args()?;
        let payload = self.round_trip(function, args).await?;
        decode_result(&payload)
    }

    async fn round_trip(&mut self, function: &str, args: Vec<Value>) -> Result<Vec<u8>> {
        debug!(service = %self.service, function, args = args.len(), "calling");
        let request = encode_call(function, args)?;
        self.transport.send(&self.service, &request).await
    }
}
