//! Callable targets and typed closure adapters
//!
//! The marshal layer only knows how to hand a [`Vec<RpcValue>`] to an
//! [`Invocable`] and take an [`RpcValue`] back. Plain Rust closures are
//! turned into invocables through [`IntoInvocable`], which also derives the
//! function's [`Signature`] from its argument and return types:
//!
//! ```
//! use sigrpc_server::{IntoInvocable, ServiceError};
//!
//! let add = |a: i32, b: i32| -> Result<i32, ServiceError> { Ok(a + b) };
//! let sig = IntoInvocable::<(i32, i32)>::signature(&add).unwrap();
//! assert_eq!(sig.key(), "int:2:int:int");
//! ```

use std::sync::Arc;

use sigrpc_common::protocol::error::{
    ARGUMENT_DECODE_FAILED, RETURN_KIND_MISMATCH,
};
use sigrpc_common::{FromRpcValue, IntoRpcValue, Result, RpcResponse, RpcValue, Signature};
use thiserror::Error;

/// An application-level failure raised by a registered function.
///
/// The code and message travel to the caller unchanged as
/// `{"err_code": code, "err_msg": message}`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct ServiceError {
    pub code: i32,
    pub message: String,
}

impl ServiceError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Why an invocation did not produce a value.
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// 1-based argument position.
    #[error("argument {index}: {message}")]
    Argument { index: usize, message: String },

    #[error("cannot encode return value: {0}")]
    Return(String),
}

impl InvokeError {
    pub fn into_response(self) -> RpcResponse {
        match self {
            InvokeError::Service(e) => RpcResponse::error(e.code, e.message),
            e @ InvokeError::Argument { .. } => RpcResponse::error(ARGUMENT_DECODE_FAILED, e.to_string()),
            e @ InvokeError::Return(_) => RpcResponse::error(RETURN_KIND_MISMATCH, e.to_string()),
        }
    }
}

/// Something the marshal layer can call with already decoded arguments.
///
/// Implemented for any `Fn(Vec<RpcValue>) -> Result<RpcValue, InvokeError>`,
/// which is what registries use when a signature is declared by hand.
pub trait Invocable: Send + Sync + 'static {
    fn invoke(&self, args: Vec<RpcValue>) -> std::result::Result<RpcValue, InvokeError>;
}

impl<F> Invocable for F
where
    F: Fn(Vec<RpcValue>) -> std::result::Result<RpcValue, InvokeError> + Send + Sync + 'static,
{
    fn invoke(&self, args: Vec<RpcValue>) -> std::result::Result<RpcValue, InvokeError> {
        self(args)
    }
}

/// Typed closures that can be registered without spelling out a signature.
///
/// `Args` is the tuple of argument types and only serves to tell the
/// implementations for different arities apart.
pub trait IntoInvocable<Args>: Sized {
    fn signature(&self) -> Result<Signature>;

    fn into_invocable(self) -> Arc<dyn Invocable>;
}

fn next_arg<A: FromRpcValue>(
    args: &mut std::vec::IntoIter<RpcValue>,
    index: usize,
) -> std::result::Result<A, InvokeError> {
    let value = args.next().ok_or_else(|| InvokeError::Argument {
        index,
        message: "missing".to_string(),
    })?;

    A::from_rpc_value(value).map_err(|e| InvokeError::Argument {
        index,
        message: e.to_string(),
    })
}

macro_rules! impl_into_invocable {
    ($($ty:ident $var:ident $idx:literal),*) => {
        impl<F, R, $($ty,)*> IntoInvocable<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> std::result::Result<R, ServiceError> + Send + Sync + 'static,
            R: IntoRpcValue + 'static,
            $($ty: FromRpcValue + 'static,)*
        {
            fn signature(&self) -> Result<Signature> {
                Signature::new(R::KIND, vec![$($ty::KIND),*])
            }

            fn into_invocable(self) -> Arc<dyn Invocable> {
                Arc::new(move |args: Vec<RpcValue>| -> std::result::Result<RpcValue, InvokeError> {
                    #[allow(unused_mut, unused_variables)]
                    let mut args = args.into_iter();
                    $(let $var: $ty = next_arg(&mut args, $idx)?;)*
                    let ret = self($($var),*)?;
                    ret.into_rpc_value().map_err(|e| InvokeError::Return(e.to_string()))
                })
            }
        }
    };
}

impl_into_invocable!();
impl_into_invocable!(A1 a1 1);
impl_into_invocable!(A1 a1 1, A2 a2 2);
impl_into_invocable!(A1 a1 1, A2 a2 2, A3 a3 3);
impl_into_invocable!(A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4);
impl_into_invocable!(A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4, A5 a5 5);
impl_into_invocable!(A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4, A5 a5 5, A6 a6 6);
