//! Call requests
//!
//! A request is a JSON array whose first element is the function name and
//! whose remaining elements are the positional arguments:
//!
//! ```text
//! ["get_substring", "hello", 2]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::TryFrom;

pub type FunctionName = String;

/// A decoded call request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<Value>")]
pub struct RpcRequest {
    pub function: FunctionName,
    pub args: Vec<Value>,
}

impl RpcRequest {
    pub fn new(function: impl Into<String>, args: Vec<Value>) -> Self {
        RpcRequest {
            function: function.into(),
            args,
        }
    }

    /// Argument at `index`, or `None` when the caller sent fewer.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }
}

impl From<RpcRequest> for Vec<Value> {
    fn from(request: RpcRequest) -> Self {
        let mut items = Vec::with_capacity(request.args.len() + 1);
        items.push(Value::String(request.function));
        items.extend(request.args);
        items
    }
}

impl TryFrom<Vec<Value>> for RpcRequest {
    type Error = String;

    fn try_from(items: Vec<Value>) -> Result<Self, Self::Error> {
        let mut items = items.into_iter();
        match items.next() {
            Some(Value::String(function)) => Ok(RpcRequest {
                function,
                args: items.collect(),
            }),
            Some(_) => Err("function name must be a string".to_string()),
            None => Err("request array is empty".to_string()),
        }
    }
}
