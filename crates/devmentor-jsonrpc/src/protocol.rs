//! Agent-to-agent message shapes carried inside JSON-RPC `message/send` calls.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::RpcError;

pub const METHOD_SEND: &str = "message/send";
pub const METHOD_CARD: &str = "agent/card";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: String },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentMessage {
    pub message_id: String,
    pub role: MessageRole,
    pub content: MessageContent,
}

impl AgentMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, MessageContent::Text { text: text.into() })
    }

    pub fn agent_text(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Agent, MessageContent::Text { text: text.into() })
    }

    pub fn agent_error(message: impl Into<String>) -> Self {
        Self::new(
            MessageRole::Agent,
            MessageContent::Error {
                message: message.into(),
            },
        )
    }

    fn new(role: MessageRole, content: MessageContent) -> Self {
        Self {
            message_id: Uuid::now_v7().to_string(),
            role,
            content,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text.as_str()),
            MessageContent::Error { .. } => None,
        }
    }
}

pub fn send_params(message: &AgentMessage) -> Value {
    json!({ "message": message })
}

/// Extracts the text of an incoming `message/send`. Error-content messages
/// are not valid input.
pub fn incoming_text(params: Value) -> Result<String, RpcError> {
    let message = params
        .get("message")
        .cloned()
        .ok_or_else(|| RpcError::InvalidParams("missing 'message'".to_string()))?;
    let message: AgentMessage = serde_json::from_value(message)
        .map_err(|err| RpcError::InvalidParams(format!("malformed message: {err}")))?;
    match message.content {
        MessageContent::Text { text } => Ok(text),
        MessageContent::Error { .. } => Err(RpcError::InvalidParams(
            "message content must be text".to_string(),
        )),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillCard {
    pub name: String,
    pub description: String,
}

/// Self-description served on `GET /` and `agent/card`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceCard {
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub methods: Vec<String>,
    pub skills: Vec<SkillCard>,
}

impl ServiceCard {
    pub fn new(name: impl Into<String>, description: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            methods: vec![METHOD_SEND.to_string(), METHOD_CARD.to_string()],
            skills: Vec::new(),
        }
    }

    pub fn with_skill(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.skills.push(SkillCard {
            name: name.into(),
            description: description.into(),
        });
        self
    }

    pub fn with_methods(mut self, methods: &[&str]) -> Self {
        self.methods = methods.iter().map(ToString::to_string).collect();
        self
    }
}
