use anyhow::Result;
use devmentor_jsonrpc::protocol::ServiceCard;
use devmentor_jsonrpc::{RootPolicy, RpcError, RpcHandler, RpcService};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{TOOL_SERVER_NAME, ToolHost};

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_LIST: &str = "tools/list";
pub const METHOD_CALL: &str = "tools/call";

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Serves the tool host over `initialize`, `tools/list` and `tools/call`.
#[derive(Debug, Clone, Default)]
pub struct ToolServerHandler {
    host: ToolHost,
}

impl ToolServerHandler {
    pub fn new(host: ToolHost) -> Self {
        Self { host }
    }

    fn list(&self) -> Value {
        let tools = self
            .host
            .definitions()
            .into_iter()
            .map(|def| {
                json!({
                    "name": def.function.name,
                    "description": def.function.description,
                    "inputSchema": def.function.parameters,
                })
            })
            .collect::<Vec<_>>();
        json!({ "tools": tools })
    }

    fn call(&self, params: &Value) -> Result<Value> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::InvalidParams("missing tool 'name'".to_string()))?;
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        debug!(tool = name, "tool call");
        let text = self.host.call(name, &arguments).map_err(|err| {
            warn!(tool = name, "rejected tool call: {err}");
            RpcError::InvalidParams(err.to_string())
        })?;
        Ok(json!({
            "content": [{ "type": "text", "text": text }],
            "isError": text.starts_with('❌'),
        }))
    }
}

impl RpcHandler for ToolServerHandler {
    fn handle(&self, method: &str, params: Value) -> Result<Value> {
        match method {
            METHOD_INITIALIZE => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": TOOL_SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": { "tools": {} },
            })),
            METHOD_LIST => Ok(self.list()),
            METHOD_CALL => self.call(&params),
            other => Err(RpcError::MethodNotFound(other.to_string()).into()),
        }
    }
}

/// The tool server as an HTTP service. Plain `GET /` is refused with 406.
pub fn tool_server_service(handler: ToolServerHandler, url: impl Into<String>) -> RpcService {
    let mut card = ServiceCard::new(
        TOOL_SERVER_NAME,
        "Quiz templates, bounded file snippets and documentation lookup",
        url,
    )
    .with_methods(&[METHOD_INITIALIZE, METHOD_LIST, METHOD_CALL]);
    for name in handler.host.names() {
        card = card.with_skill(name, "tool");
    }
    RpcService::new(Arc::new(handler), card).with_root_policy(RootPolicy::RequireEventStream)
}
