use std::collections::HashMap;
use std::sync::Arc;

use sigrpc_common::protocol::error::{FUNCTION_NOT_FOUND, INVALID_REQUEST, RETURN_KIND_MISMATCH, SERVICE_NOT_FOUND};
use sigrpc_common::transport::JsonCodec;
use sigrpc_common::{Result, RpcResponse, Signature, SigrpcError};
use tracing::{debug, info, warn};

use crate::invoke::{IntoInvocable, Invocable};
use crate::marshal::{MarshalFn, MarshalRegistry};

/// A function as stored in its service.
pub struct RegisteredFunction {
    name: String,
    signature: Signature,
    marshal: MarshalFn,
    target: Arc<dyn Invocable>,
}

impl RegisteredFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

/// A named group of functions.
pub struct Service {
    name: String,
    functions: HashMap<String, RegisteredFunction>,
}

impl Service {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            functions: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self, name: &str) -> Option<&RegisteredFunction> {
        self.functions.get(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Services and their functions, plus the marshal routines they resolve to.
///
/// Built with `&mut self` during startup, then shared as
/// `Arc<FunctionRegistry>` and only read. [`call_function`] is the single
/// entry point for transports.
///
/// # Example
///
/// ```
/// use sigrpc_server::{FunctionRegistry, ServiceError};
///
/// let mut registry = FunctionRegistry::with_default_marshals().unwrap();
/// registry.create_service("test-rpc");
/// registry
///     .register_function("test-rpc", "add", |a: i32, b: i32| -> Result<i32, ServiceError> {
///         Ok(a + b)
///     })
///     .unwrap();
///
/// let response = registry.call_function("test-rpc", br#"["add",2,3]"#);
/// assert_eq!(response, br#"{"ret":5}"#);
/// ```
///
/// [`call_function`]: FunctionRegistry::call_function
pub struct FunctionRegistry {
    marshals: MarshalRegistry,
    services: HashMap<String, Service>,
}

impl FunctionRegistry {
    pub fn new(marshals: MarshalRegistry) -> Self {
        Self {
            marshals,
            services: HashMap::new(),
        }
    }

    /// Registry backed by [`MarshalRegistry::with_defaults`].
    pub fn with_default_marshals() -> Result<Self> {
        Ok(Self::new(MarshalRegistry::with_defaults()?))
    }

    pub fn marshals(&self) -> &MarshalRegistry {
        &self.marshals
    }

    /// Adds the marshal routine for a signature after construction.
    pub fn marshals_mut(&mut self) -> &mut MarshalRegistry {
        &mut self.marshals
    }

    /// Creates a service. Returns `false` if it already existed, in which
    /// case it is left untouched.
    pub fn create_service(&mut self, name: &str) -> bool {
        if self.services.contains_key(name) {
            return false;
        }

        info!(service = name, "service created");
        self.services.insert(name.to_string(), Service::new(name));
        true
    }

    /// Removes a service and all of its functions.
    pub fn remove_service(&mut self, name: &str) -> bool {
        let removed = self.services.remove(name).is_some();
        if removed {
            info!(service = name, "service removed");
        }
        removed
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Registers a typed closure. Its signature is derived from the
    /// closure's argument and return types.
    ///
    /// # Errors
    ///
    /// - `ServiceNotFound` if `service` was never created
    /// - `UnknownSignature` if no marshal routine handles the signature
    /// - `DuplicateFunction` if `name` is taken in `service`
    pub fn register_function<F, Args>(&mut self, service: &str, name: &str, f: F) -> Result<()>
    where
        F: IntoInvocable<Args>,
    {
        let signature = f.signature()?;
        self.register_with_signature(service, name, signature, f.into_invocable())
    }

    /// Registers a callable under an explicitly declared signature.
    ///
    /// The callable must return values of the declared kind; a mismatch is
    /// reported to callers as `RETURN_KIND_MISMATCH`.
    pub fn register_with_signature(
        &mut self,
        service: &str,
        name: &str,
        signature: Signature,
        target: Arc<dyn Invocable>,
    ) -> Result<()> {
        let marshal = self.marshals.lookup(&signature)?.marshal;

        let svc = self
            .services
            .get_mut(service)
            .ok_or_else(|| SigrpcError::ServiceNotFound(service.to_string()))?;

        if svc.functions.contains_key(name) {
            return Err(SigrpcError::DuplicateFunction {
                service: service.to_string(),
                function: name.to_string(),
            });
        }

        debug!(service, function = name, signature = %signature, "function registered");
        svc.functions.insert(
            name.to_string(),
            RegisteredFunction {
                name: name.to_string(),
                signature,
                marshal,
                target,
            },
        );
        Ok(())
    }

    /// Executes one serialized request against `service`.
    ///
    /// Never fails: the returned bytes are always a serialized response,
    /// either the function's result or one of `SERVICE_NOT_FOUND`,
    /// `INVALID_REQUEST`, `FUNCTION_NOT_FOUND` or whatever the marshal
    /// routine answered.
    pub fn call_function(&self, service: &str, request: &[u8]) -> Vec<u8> {
        encode(self.call(service, request))
    }

    fn call(&self, service: &str, request: &[u8]) -> RpcResponse {
        let Some(svc) = self.services.get(service) else {
            warn!(service, "call to unknown service");
            return RpcResponse::error(SERVICE_NOT_FOUND, format!("Unknown service: {}", service));
        };

        let request = match JsonCodec::decode_request(request) {
            Ok(request) => request,
            Err(e) => {
                warn!(service, error = %e, "malformed request");
                return RpcResponse::error(INVALID_REQUEST, e.to_string());
            }
        };

        let Some(func) = svc.functions.get(&request.function) else {
            warn!(service, function = %request.function, "call to unknown function");
            return RpcResponse::error(
                FUNCTION_NOT_FOUND,
                format!("Unknown function: {}", request.function),
            );
        };

        debug!(service, function = %request.function, args = request.args.len(), "calling");
        (func.marshal)(&func.signature, func.target.as_ref(), request.args)
    }
}

/// Serializes a response. Falls back to a fixed error body if
/// serialization itself fails.
pub(crate) fn encode(response: RpcResponse) -> Vec<u8> {
    JsonCodec::encode_response(&response).unwrap_or_else(|e| {
        warn!(error = %e, "failed to serialize response");
        format!(
            r#"{{"err_code":{},"err_msg":"response serialization failed"}}"#,
            RETURN_KIND_MISMATCH
        )
        .into_bytes()
    })
}
