//! One persona's backend: a system prompt, an LLM and a bounded tool loop,
//! served as a JSON-RPC agent.

use anyhow::{Result, anyhow};
use devmentor_core::{ChatMessage, ChatRequest, LlmToolCall, ToolDefinition};
use devmentor_jsonrpc::protocol::{
    AgentMessage, METHOD_CARD, METHOD_SEND, ServiceCard, incoming_text,
};
use devmentor_jsonrpc::{RpcError, RpcHandler, RpcService};
use devmentor_llm::LlmClient;
use devmentor_personas::PersonaDescriptor;
use devmentor_tools::{ToolHost, ToolServerClient};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SKILL_NAME: &str = "conduct_session";

/// Executes a tool call on behalf of the model. Failures are `❌` strings.
pub trait ToolRunner: Send + Sync {
    fn run(&self, name: &str, arguments: Value) -> String;
}

impl ToolRunner for ToolServerClient {
    fn run(&self, name: &str, arguments: Value) -> String {
        self.call_tool(name, arguments)
    }
}

impl ToolRunner for ToolHost {
    fn run(&self, name: &str, arguments: Value) -> String {
        self.call(name, &arguments)
            .unwrap_or_else(|err| format!("❌ Tool '{name}' failed: {err}"))
    }
}

pub struct PersonaAgent {
    persona: PersonaDescriptor,
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolRunner>,
    tool_definitions: Vec<ToolDefinition>,
    max_tool_rounds: u8,
    temperature: Option<f32>,
    card: ServiceCard,
}

impl PersonaAgent {
    pub fn new(
        persona: PersonaDescriptor,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolRunner>,
        url: impl Into<String>,
    ) -> Self {
        let card = ServiceCard::new(&persona.display_name, &persona.description, url)
            .with_skill(SKILL_NAME, &persona.description);
        Self {
            persona,
            llm,
            tools,
            tool_definitions: ToolHost::new().definitions(),
            max_tool_rounds: 3,
            temperature: None,
            card,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: u8) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_tool_definitions(mut self, definitions: Vec<ToolDefinition>) -> Self {
        self.tool_definitions = definitions;
        self
    }

    pub fn persona(&self) -> &PersonaDescriptor {
        &self.persona
    }

    pub fn card(&self) -> &ServiceCard {
        &self.card
    }

    /// Runs one user message through the model, executing requested tools
    /// for at most `max_tool_rounds` rounds. The last request carries no
    /// tools so the model has to answer in text.
    pub fn answer(&self, user_text: &str) -> Result<String> {
        let mut messages = vec![
            ChatMessage::System {
                content: self.persona.system_prompt.clone(),
            },
            ChatMessage::User {
                content: user_text.to_string(),
            },
        ];

        let mut round: u8 = 0;
        loop {
            let offer_tools = round < self.max_tool_rounds && !self.tool_definitions.is_empty();
            let request = ChatRequest {
                model: String::new(),
                messages: messages.clone(),
                tools: if offer_tools {
                    self.tool_definitions.clone()
                } else {
                    Vec::new()
                },
                temperature: self.temperature,
            };
            let response = self.llm.complete_chat(&request)?;

            if response.tool_calls.is_empty() || !offer_tools {
                if response.text.trim().is_empty() {
                    return Err(anyhow!("the model returned an empty answer"));
                }
                info!(
                    persona = %self.persona.key,
                    rounds = round,
                    chars = response.text.chars().count(),
                    "answer ready"
                );
                return Ok(response.text);
            }

            messages.push(ChatMessage::Assistant {
                content: (!response.text.is_empty()).then(|| response.text.clone()),
                tool_calls: response.tool_calls.clone(),
            });
            for call in &response.tool_calls {
                let output = self.run_tool(call);
                messages.push(ChatMessage::Tool {
                    tool_call_id: call.id.clone(),
                    content: output,
                });
            }
            round = round.saturating_add(1);
        }
    }

    fn run_tool(&self, call: &LlmToolCall) -> String {
        let arguments = match serde_json::from_str::<Value>(&call.arguments) {
            Ok(Value::Null) => json!({}),
            Ok(arguments) => arguments,
            Err(err) => {
                warn!(tool = %call.name, "model sent malformed tool arguments: {err}");
                return format!("❌ Invalid JSON arguments for '{}': {err}", call.name);
            }
        };
        debug!(persona = %self.persona.key, tool = %call.name, "running tool");
        self.tools.run(&call.name, arguments)
    }
}

impl RpcHandler for PersonaAgent {
    fn handle(&self, method: &str, params: Value) -> Result<Value> {
        match method {
            METHOD_SEND => {
                let text = incoming_text(params)?;
                let reply = match self.answer(&text) {
                    Ok(answer) => AgentMessage::agent_text(answer),
                    Err(err) => {
                        warn!(persona = %self.persona.key, "could not answer: {err:#}");
                        AgentMessage::agent_error(format!("{err:#}"))
                    }
                };
                Ok(serde_json::to_value(reply)?)
            }
            METHOD_CARD => Ok(serde_json::to_value(&self.card)?),
            other => Err(RpcError::MethodNotFound(other.to_string()).into()),
        }
    }
}

pub fn persona_service(agent: PersonaAgent) -> RpcService {
    let card = agent.card().clone();
    RpcService::new(Arc::new(agent), card)
}
