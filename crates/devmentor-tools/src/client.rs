use anyhow::{Result, anyhow};
use devmentor_core::ToolDefinition;
use devmentor_jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use crate::server::{METHOD_CALL, METHOD_LIST};

/// Blocking JSON-RPC client for a running tool server.
#[derive(Debug, Clone)]
pub struct ToolServerClient {
    base_url: String,
    client: Client,
}

impl ToolServerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).no_proxy().build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Calls `name` and returns its text. Failures come back as a `❌` string
    /// so the caller can hand them straight to the model.
    pub fn call_tool(&self, name: &str, arguments: Value) -> String {
        match self.try_call_tool(name, arguments) {
            Ok(text) => text,
            Err(err) => {
                warn!(tool = name, "tool server call failed: {err:#}");
                format!("❌ Tool '{name}' failed: {err:#}")
            }
        }
    }

    pub fn try_call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        let result = self.request(METHOD_CALL, json!({ "name": name, "arguments": arguments }))?;
        result
            .get("content")
            .and_then(Value::as_array)
            .and_then(|items| {
                items
                    .iter()
                    .find(|item| item.get("type").and_then(Value::as_str) == Some("text"))
            })
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| anyhow!("tool result carried no text content"))
    }

    pub fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let result = self.request(METHOD_LIST, json!({}))?;
        let tools = result
            .get("tools")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|entry| {
                        let name = entry.get("name")?.as_str()?;
                        let description = entry
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        let schema = entry
                            .get("inputSchema")
                            .cloned()
                            .unwrap_or_else(|| json!({"type": "object"}));
                        Some(ToolDefinition::function(name, description, schema))
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(tools)
    }

    fn request(&self, method: &str, params: Value) -> Result<Value> {
        let request = JsonRpcRequest::new(method, params);
        let url = format!("{}/rpc", self.base_url);
        debug!(%url, method, "tool server request");
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json, text/event-stream")
            .json(&request)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    anyhow!("timed out waiting for the tool server at {}", self.base_url)
                } else if err.is_connect() {
                    anyhow!("tool server at {} is unreachable", self.base_url)
                } else {
                    anyhow!("request to the tool server failed: {err}")
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("tool server answered HTTP {}", status.as_u16()));
        }
        let response: JsonRpcResponse = response
            .json()
            .map_err(|err| anyhow!("malformed tool server response: {err}"))?;
        if let Some(error) = response.error {
            return Err(anyhow!("{} (code {})", error.message, error.code));
        }
        response
            .result
            .ok_or_else(|| anyhow!("tool server response had neither result nor error"))
    }
}
