use anyhow::{Result, anyhow};
use devmentor_core::{ChatMessage, ChatRequest, LlmConfig, LlmResponse, LlmToolCall};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::error::Error as StdError;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub trait LlmClient: Send + Sync {
    /// Chat completion with optional tool definitions (function calling).
    fn complete_chat(&self, req: &ChatRequest) -> Result<LlmResponse>;
}

/// OpenAI-compatible chat completions client for OpenRouter.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    cfg: LlmConfig,
    client: Client,
}

impl OpenRouterClient {
    pub fn new(cfg: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()?;
        Ok(Self { cfg, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.cfg
    }

    /// A request for `model` (or the configured model when empty).
    pub fn request(&self, messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest {
            model: self.cfg.model.clone(),
            messages,
            tools: Vec::new(),
            temperature: self.cfg.temperature,
        }
    }

    fn complete_inner(&self, payload: &Value, api_key: &str) -> Result<LlmResponse> {
        let mut last_err: Option<anyhow::Error> = None;
        let mut attempt: u8 = 0;
        while attempt <= self.cfg.max_retries {
            let response = self
                .client
                .post(&self.cfg.endpoint)
                .bearer_auth(api_key)
                .header("X-Title", "DevMentor")
                .json(payload)
                .send();

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text()?;
                    if status.is_success() {
                        return parse_chat_payload(&body);
                    }
                    last_err = Some(format_api_error(
                        status,
                        &body,
                        &self.cfg.api_key_env,
                        attempt,
                        self.cfg.max_retries,
                    ));
                    if should_retry_status(status) && attempt < self.cfg.max_retries {
                        warn!("llm request failed with {status}, retrying");
                        thread::sleep(retry_delay(self.cfg.retry_base_ms, attempt));
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                    break;
                }
                Err(e) => {
                    last_err = Some(format_transport_error(&e));
                    if (e.is_timeout() || e.is_connect()) && attempt < self.cfg.max_retries {
                        warn!("llm transport error, retrying: {e}");
                        thread::sleep(retry_delay(self.cfg.retry_base_ms, attempt));
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                    break;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("llm request failed without detailed error")))
    }
}

impl LlmClient for OpenRouterClient {
    fn complete_chat(&self, req: &ChatRequest) -> Result<LlmResponse> {
        let key = self.cfg.resolve_api_key().ok_or_else(|| {
            anyhow!(
                "{} not set and llm.api_key is empty",
                self.cfg.api_key_env
            )
        })?;
        let payload = build_chat_payload(req, &self.cfg.model);
        debug!(
            model = payload["model"].as_str().unwrap_or_default(),
            messages = req.messages.len(),
            tools = req.tools.len(),
            "sending chat completion"
        );
        self.complete_inner(&payload, &key)
    }
}

fn build_chat_payload(req: &ChatRequest, fallback_model: &str) -> Value {
    let model = if req.model.trim().is_empty() {
        fallback_model
    } else {
        req.model.as_str()
    };
    let messages = req
        .messages
        .iter()
        .map(|m| match m {
            ChatMessage::System { content } => json!({"role": "system", "content": content}),
            ChatMessage::User { content } => json!({"role": "user", "content": content}),
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut msg = json!({"role": "assistant", "content": content});
                if !tool_calls.is_empty() {
                    msg["tool_calls"] = tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {"name": tc.name, "arguments": tc.arguments}
                            })
                        })
                        .collect();
                }
                msg
            }
            ChatMessage::Tool {
                tool_call_id,
                content,
            } => json!({"role": "tool", "tool_call_id": tool_call_id, "content": content}),
        })
        .collect::<Vec<_>>();

    let mut payload = json!({
        "model": model,
        "messages": messages,
    });
    if !req.tools.is_empty() {
        payload["tools"] = json!(req.tools);
        payload["tool_choice"] = json!("auto");
    }
    if let Some(temperature) = req.temperature {
        payload["temperature"] = json!(temperature);
    }
    payload
}

fn parse_chat_payload(body: &str) -> Result<LlmResponse> {
    let value: Value = serde_json::from_str(body)?;
    let Some(choice) = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
    else {
        return Err(anyhow!("unexpected completion payload: missing choices[0]"));
    };
    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .unwrap_or("stop")
        .to_string();
    let message = choice.get("message").cloned().unwrap_or_else(|| json!({}));
    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tool_calls = message
        .get("tool_calls")
        .map(parse_tool_calls)
        .unwrap_or_default();
    if text.is_empty() && tool_calls.is_empty() {
        return Err(anyhow!(
            "unexpected completion payload: missing message.content and tool_calls"
        ));
    }
    Ok(LlmResponse {
        text,
        finish_reason,
        tool_calls,
    })
}

fn parse_tool_calls(value: &Value) -> Vec<LlmToolCall> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let function = item.get("function")?;
            let name = function.get("name").and_then(Value::as_str)?.trim();
            if name.is_empty() {
                return None;
            }
            let arguments = match function.get("arguments") {
                Some(Value::String(raw)) => raw.clone(),
                Some(other) => other.to_string(),
                None => "{}".to_string(),
            };
            let id = item
                .get("id")
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .unwrap_or_else(|| format!("call_{idx}"));
            Some(LlmToolCall {
                id,
                name: name.to_string(),
                arguments,
            })
        })
        .collect()
}

fn should_retry_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
    )
}

fn retry_delay(base_ms: u64, attempt: u8) -> Duration {
    let exponential = base_ms.saturating_mul(2_u64.saturating_pow(u32::from(attempt)));
    Duration::from_millis(exponential)
}

fn format_api_error(
    status: StatusCode,
    body: &str,
    api_key_env: &str,
    attempt: u8,
    max_retries: u8,
) -> anyhow::Error {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(ToString::to_string))
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    match status {
        StatusCode::UNAUTHORIZED => anyhow!(
            "Invalid or missing API key (HTTP 401).\n\
             Set the {api_key_env} environment variable or configure llm.api_key in settings.\n\
             Get an API key at https://openrouter.ai/keys"
        ),
        StatusCode::PAYMENT_REQUIRED => anyhow!(
            "Insufficient credits (HTTP 402). Add credits to your OpenRouter account. Detail: {detail}"
        ),
        StatusCode::TOO_MANY_REQUESTS => anyhow!(
            "Rate limited (HTTP 429). Exhausted {}/{} attempts. Detail: {}",
            u16::from(attempt) + 1,
            u16::from(max_retries) + 1,
            detail
        ),
        _ => anyhow!("LLM API error (HTTP {}): {}", status.as_u16(), detail),
    }
}

fn format_transport_error(err: &reqwest::Error) -> anyhow::Error {
    let inner_msg = err
        .source()
        .map(|e| e.to_string())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let is_dns = inner_msg.contains("dns")
        || inner_msg.contains("resolve")
        || inner_msg.contains("name or service not known")
        || inner_msg.contains("no such host");

    if err.is_timeout() {
        anyhow!(
            "Request timed out. The LLM API did not respond in time; \
             consider increasing llm.timeout_seconds."
        )
    } else if is_dns {
        anyhow!("DNS resolution failed. Could not resolve the LLM API hostname.")
    } else if err.is_connect() {
        anyhow!("Connection refused. Could not reach the LLM API at the configured endpoint.")
    } else {
        anyhow!("LLM request failed: {err}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devmentor_core::ToolDefinition;
    use devmentor_testkit::{MockHttpServer, MockResponse, closed_port};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(endpoint: String) -> LlmConfig {
        LlmConfig {
            endpoint,
            api_key: Some("sk-test-key".to_string()),
            api_key_env: "DEVMENTOR_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            timeout_seconds: 5,
            max_retries: 1,
            retry_base_ms: 10,
            ..LlmConfig::default()
        }
    }

    fn user_request(client: &OpenRouterClient) -> ChatRequest {
        client.request(vec![
            ChatMessage::System {
                content: "You are a tutor.".to_string(),
            },
            ChatMessage::User {
                content: "What is Big O?".to_string(),
            },
        ])
    }

    #[test]
    fn parses_text_reply() {
        let got = parse_chat_payload(r#"{"choices":[{"message":{"content":"hello"}}]}"#)
            .expect("parse");
        assert_eq!(got.text, "hello");
        assert_eq!(got.finish_reason, "stop");
        assert!(got.tool_calls.is_empty());
    }

    #[test]
    fn parses_tool_calls() {
        let body = r#"{"choices":[{"finish_reason":"tool_calls","message":{"content":null,
            "tool_calls":[{"id":"call_1","type":"function",
            "function":{"name":"search_docs","arguments":"{\"query\":\"big o notation\"}"}}]}}]}"#;
        let got = parse_chat_payload(body).expect("parse");
        assert_eq!(got.finish_reason, "tool_calls");
        assert_eq!(
            got.tool_calls,
            vec![LlmToolCall {
                id: "call_1".to_string(),
                name: "search_docs".to_string(),
                arguments: r#"{"query":"big o notation"}"#.to_string(),
            }]
        );
    }

    #[test]
    fn rejects_empty_payloads() {
        assert!(parse_chat_payload(r#"{"choices":[]}"#).is_err());
        assert!(parse_chat_payload(r#"{"choices":[{"message":{"content":""}}]}"#).is_err());
    }

    #[test]
    fn payload_includes_tools_only_when_present() {
        let mut req = ChatRequest {
            model: String::new(),
            messages: vec![ChatMessage::User {
                content: "hi".to_string(),
            }],
            tools: Vec::new(),
            temperature: None,
        };
        let plain = build_chat_payload(&req, "openai/gpt-4o-mini");
        assert_eq!(plain["model"], "openai/gpt-4o-mini");
        assert!(plain.get("tools").is_none());
        assert!(plain.get("temperature").is_none());

        req.tools.push(ToolDefinition::function(
            "search_docs",
            "Search docs",
            json!({"type": "object"}),
        ));
        req.temperature = Some(0.3);
        let with_tools = build_chat_payload(&req, "openai/gpt-4o-mini");
        assert_eq!(with_tools["tools"][0]["function"]["name"], "search_docs");
        assert_eq!(with_tools["tool_choice"], "auto");
    }

    #[test]
    fn assistant_tool_calls_are_echoed_back() {
        let req = ChatRequest {
            model: "m".to_string(),
            messages: vec![
                ChatMessage::Assistant {
                    content: None,
                    tool_calls: vec![LlmToolCall {
                        id: "call_9".to_string(),
                        name: "search_docs".to_string(),
                        arguments: "{}".to_string(),
                    }],
                },
                ChatMessage::Tool {
                    tool_call_id: "call_9".to_string(),
                    content: "result".to_string(),
                },
            ],
            tools: Vec::new(),
            temperature: None,
        };
        let payload = build_chat_payload(&req, "unused");
        assert_eq!(payload["model"], "m");
        assert_eq!(payload["messages"][0]["tool_calls"][0]["id"], "call_9");
        assert_eq!(payload["messages"][1]["role"], "tool");
        assert_eq!(payload["messages"][1]["tool_call_id"], "call_9");
    }

    #[test]
    fn missing_key_fails_at_call_time() {
        let mut cfg = config(format!("http://127.0.0.1:{}/", closed_port()));
        cfg.api_key = None;
        let client = OpenRouterClient::new(cfg).expect("client builds without a key");
        let err = client
            .complete_chat(&user_request(&client))
            .expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "DEVMENTOR_TEST_KEY_THAT_IS_NEVER_SET not set and llm.api_key is empty"
        );
    }

    #[test]
    fn sends_bearer_key_and_reads_reply() {
        let server = MockHttpServer::start(|_| {
            MockResponse::json(
                200,
                r#"{"choices":[{"message":{"content":"O(n) means linear."}}]}"#,
            )
        });
        let client =
            OpenRouterClient::new(config(format!("{}/chat/completions", server.url())))
                .expect("client");
        let reply = client
            .complete_chat(&user_request(&client))
            .expect("reply");
        assert_eq!(reply.text, "O(n) means linear.");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/chat/completions");
        assert_eq!(requests[0].header("authorization"), Some("Bearer sk-test-key"));
        let body: Value = serde_json::from_str(&requests[0].body).expect("json body");
        assert_eq!(body["model"], "openai/gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "What is Big O?");
    }

    #[test]
    fn retries_transient_status_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_server = Arc::clone(&calls);
        let server = MockHttpServer::start(move |_| {
            if calls_server.fetch_add(1, Ordering::SeqCst) == 0 {
                MockResponse::json(503, r#"{"error":{"message":"overloaded"}}"#)
            } else {
                MockResponse::json(200, r#"{"choices":[{"message":{"content":"ok"}}]}"#)
            }
        });
        let client = OpenRouterClient::new(config(server.url())).expect("client");
        let reply = client
            .complete_chat(&user_request(&client))
            .expect("reply");
        assert_eq!(reply.text, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unauthorized_is_not_retried_and_names_the_env_var() {
        let server = MockHttpServer::start(|_| {
            MockResponse::json(401, r#"{"error":{"message":"No auth credentials found"}}"#)
        });
        let client = OpenRouterClient::new(config(server.url())).expect("client");
        let err = client
            .complete_chat(&user_request(&client))
            .expect_err("401");
        let msg = err.to_string();
        assert!(msg.contains("HTTP 401"), "{msg}");
        assert!(msg.contains("DEVMENTOR_TEST_KEY_THAT_IS_NEVER_SET"), "{msg}");
        assert_eq!(server.requests().len(), 1);
    }

    #[test]
    fn connection_refused_is_reported_as_transport_error() {
        let mut cfg = config(format!("http://127.0.0.1:{}/", closed_port()));
        cfg.max_retries = 0;
        let client = OpenRouterClient::new(cfg).expect("client");
        let err = client
            .complete_chat(&user_request(&client))
            .expect_err("refused");
        assert!(err.to_string().contains("Could not reach"), "{err}");
    }
}
