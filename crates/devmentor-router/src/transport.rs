use devmentor_jsonrpc::protocol::{AgentMessage, METHOD_SEND, MessageContent, send_params};
use devmentor_jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use reqwest::blocking::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// What a persona backend answered.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    Text(String),
    /// The backend replied with error content; the message is the remote one.
    Error(String),
    /// A well-formed reply that is not an agent message.
    Opaque(Value),
}

/// Failures below the reply level. `Display` renders as `"{Kind}: {message}"`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Unreachable: {0}")]
    Unreachable(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("ProtocolError: {0}")]
    ProtocolError(String),
    #[error("Unknown: {0}")]
    Unknown(String),
}

impl TransportError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "Unreachable",
            Self::Timeout(_) => "Timeout",
            Self::ProtocolError(_) => "ProtocolError",
            Self::Unknown(_) => "Unknown",
        }
    }
}

pub trait AgentClient: Send + Sync {
    fn send(&self, message: &AgentMessage) -> Result<AgentReply, TransportError>;
}

/// Creates clients bound to one backend address.
pub trait AgentConnector: Send + Sync {
    fn connect(&self, base_url: &str) -> Result<Arc<dyn AgentClient>, TransportError>;
}

/// JSON-RPC `message/send` over blocking HTTP.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    base_url: String,
    client: Client,
}

impl HttpAgentClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|err| TransportError::Unknown(err.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl AgentClient for HttpAgentClient {
    fn send(&self, message: &AgentMessage) -> Result<AgentReply, TransportError> {
        let request = JsonRpcRequest::new(METHOD_SEND, send_params(message));
        let url = format!("{}/rpc", self.base_url);
        debug!(%url, message_id = %message.message_id, "sending message");
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|err| classify_send_error(&url, &err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::ProtocolError(format!(
                "{url} answered HTTP {}",
                status.as_u16()
            )));
        }
        let response: JsonRpcResponse = response
            .json()
            .map_err(|err| TransportError::ProtocolError(format!("malformed response: {err}")))?;
        if let Some(error) = response.error {
            return Ok(AgentReply::Error(error.message));
        }
        let Some(result) = response.result else {
            return Err(TransportError::ProtocolError(
                "response had neither result nor error".to_string(),
            ));
        };
        Ok(match serde_json::from_value::<AgentMessage>(result.clone()) {
            Ok(reply) => match reply.content {
                MessageContent::Text { text } => AgentReply::Text(text),
                MessageContent::Error { message } => AgentReply::Error(message),
            },
            Err(_) => AgentReply::Opaque(result),
        })
    }
}

fn classify_send_error(url: &str, err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(format!("no reply from {url} in time"))
    } else if err.is_connect() {
        TransportError::Unreachable(format!("could not connect to {url}"))
    } else if err.is_decode() || err.is_body() {
        TransportError::ProtocolError(err.to_string())
    } else {
        TransportError::Unknown(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct HttpConnector {
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl AgentConnector for HttpConnector {
    fn connect(&self, base_url: &str) -> Result<Arc<dyn AgentClient>, TransportError> {
        Ok(Arc::new(HttpAgentClient::new(base_url, self.timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devmentor_testkit::{MockHttpServer, MockResponse, RecordedRequest, closed_port};
    use serde_json::json;

    fn reply_with(request: &RecordedRequest, payload: Value) -> MockResponse {
        let id = serde_json::from_str::<Value>(&request.body)
            .ok()
            .and_then(|v| v.get("id").cloned())
            .unwrap_or(Value::Null);
        let mut body = json!({"jsonrpc": "2.0", "id": id});
        body[payload["key"].as_str().unwrap_or("result")] = payload["value"].clone();
        MockResponse::json(200, body.to_string())
    }

    fn client(url: String) -> HttpAgentClient {
        HttpAgentClient::new(url, Duration::from_secs(2)).expect("client")
    }

    #[test]
    fn text_reply_is_extracted() {
        let server = MockHttpServer::start(|req| {
            let reply = serde_json::to_value(AgentMessage::agent_text("Let's start with arrays."))
                .unwrap_or_default();
            reply_with(req, json!({"key": "result", "value": reply}))
        });
        let reply = client(server.url())
            .send(&AgentMessage::user_text("hi"))
            .expect("reply");
        assert_eq!(reply, AgentReply::Text("Let's start with arrays.".to_string()));

        let sent: Value = serde_json::from_str(&server.requests()[0].body).expect("body");
        assert_eq!(sent["method"], "message/send");
        assert_eq!(sent["params"]["message"]["content"]["text"], "hi");
        assert_eq!(sent["params"]["message"]["role"], "user");
    }

    #[test]
    fn error_content_and_rpc_errors_become_error_replies() {
        let server = MockHttpServer::start(|req| {
            let reply = serde_json::to_value(AgentMessage::agent_error("quota exceeded"))
                .unwrap_or_default();
            reply_with(req, json!({"key": "result", "value": reply}))
        });
        assert_eq!(
            client(server.url())
                .send(&AgentMessage::user_text("hi"))
                .expect("reply"),
            AgentReply::Error("quota exceeded".to_string())
        );

        let rpc_error = MockHttpServer::start(|req| {
            reply_with(
                req,
                json!({"key": "error", "value": {"code": -32603, "message": "backend down"}}),
            )
        });
        assert_eq!(
            client(rpc_error.url())
                .send(&AgentMessage::user_text("hi"))
                .expect("reply"),
            AgentReply::Error("backend down".to_string())
        );
    }

    #[test]
    fn unexpected_results_are_opaque() {
        let server = MockHttpServer::start(|req| {
            reply_with(req, json!({"key": "result", "value": {"artifacts": [1, 2]}}))
        });
        assert_eq!(
            client(server.url())
                .send(&AgentMessage::user_text("hi"))
                .expect("reply"),
            AgentReply::Opaque(json!({"artifacts": [1, 2]}))
        );
    }

    #[test]
    fn transport_failures_are_classified() {
        let refused = client(format!("http://127.0.0.1:{}", closed_port()))
            .send(&AgentMessage::user_text("hi"))
            .expect_err("refused");
        assert_eq!(refused.kind(), "Unreachable");

        let broken = MockHttpServer::start(|_| MockResponse::status(502));
        let err = client(broken.url())
            .send(&AgentMessage::user_text("hi"))
            .expect_err("502");
        assert_eq!(err.kind(), "ProtocolError");
        assert!(err.to_string().starts_with("ProtocolError: "));
        assert!(err.to_string().ends_with("answered HTTP 502"));

        let slow = MockHttpServer::start(|_| {
            MockResponse::json(200, "{}").delayed(Duration::from_millis(800))
        });
        let err = HttpAgentClient::new(slow.url(), Duration::from_millis(200))
            .expect("client")
            .send(&AgentMessage::user_text("hi"))
            .expect_err("timeout");
        assert_eq!(err.kind(), "Timeout");
    }
}
