pub mod envelope;
pub mod error;
pub mod requests;
pub mod responses;
pub mod types;
pub mod value;


pub use envelope::Envelope;
pub use error::{Result, SigrpcError};
pub use requests::{FunctionName, RpcRequest};
pub use responses::RpcResponse;
pub use types::{compute_signature, ParamType, Signature};
pub use value::{FromRpcValue, IntoRpcValue, ObjList, Object, RpcValue, NUMERIC_SENTINEL};
