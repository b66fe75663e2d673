use std::sync::Arc;

use sigrpc_common::transport::Transport;
use sigrpc_common::Result;

use crate::registry::FunctionRegistry;

/// In-process transport: calls straight into a [`FunctionRegistry`], with
/// no framing and no envelope.
#[derive(Clone)]
pub struct LocalTransport {
    registry: Arc<FunctionRegistry>,
}

impl LocalTransport {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }
}

impl Transport for LocalTransport {
    fn send(&mut self, service: &str, request: &[u8]) -> Result<Vec<u8>> {
        Ok(self.registry.call_function(service, request))
    }
}
