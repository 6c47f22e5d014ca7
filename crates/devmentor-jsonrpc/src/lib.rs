use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod http;
pub mod protocol;

pub use http::{RootPolicy, RpcService, serve_rpc};

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Standard JSON-RPC error codes.
pub const ERR_PARSE: i64 = -32700;
pub const ERR_METHOD_NOT_FOUND: i64 = -32601;
pub const ERR_INVALID_PARAMS: i64 = -32602;
pub const ERR_INTERNAL: i64 = -32603;

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Value::String(uuid::Uuid::now_v7().to_string()),
            method: method.into(),
            params,
        }
    }
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Failures a handler reports with a specific JSON-RPC code. Any other
/// error becomes `ERR_INTERNAL`.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

impl RpcError {
    fn code(&self) -> i64 {
        match self {
            Self::MethodNotFound(_) => ERR_METHOD_NOT_FOUND,
            Self::InvalidParams(_) => ERR_INVALID_PARAMS,
        }
    }
}

/// Trait for handling JSON-RPC method dispatching.
pub trait RpcHandler: Send + Sync {
    fn handle(&self, method: &str, params: Value) -> Result<Value>;
}

/// Runs one request through `handler` and wraps the outcome in a response.
pub fn respond(handler: &dyn RpcHandler, request: JsonRpcRequest) -> JsonRpcResponse {
    match handler.handle(&request.method, request.params) {
        Ok(result) => JsonRpcResponse::success(request.id, result),
        Err(err) => {
            let code = err
                .downcast_ref::<RpcError>()
                .map(RpcError::code)
                .unwrap_or(ERR_INTERNAL);
            JsonRpcResponse::error(request.id, code, err.to_string())
        }
    }
}
