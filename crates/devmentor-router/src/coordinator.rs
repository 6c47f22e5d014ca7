use anyhow::Result;
use devmentor_jsonrpc::protocol::{
    AgentMessage, METHOD_CARD, METHOD_SEND, ServiceCard, incoming_text,
};
use devmentor_jsonrpc::{RpcError, RpcHandler, RpcService};
use serde_json::Value;
use std::sync::Arc;

use crate::Router;

pub const COORDINATOR_NAME: &str = "DevMentor Coordinator";

/// Accepts `"persona_key:text"` messages and forwards them through a [`Router`].
pub struct CoordinatorHandler {
    router: Arc<Router>,
    card: ServiceCard,
}

impl CoordinatorHandler {
    pub fn new(router: Arc<Router>, url: impl Into<String>) -> Self {
        let card = ServiceCard::new(
            COORDINATOR_NAME,
            "Routes messages to the specialized mentor personas",
            url,
        )
        .with_skill(
            "route_to_agent",
            "Forwards 'persona_key:message' to that persona, anything else to the default",
        );
        Self { router, card }
    }

    pub fn card(&self) -> &ServiceCard {
        &self.card
    }
}

impl RpcHandler for CoordinatorHandler {
    fn handle(&self, method: &str, params: Value) -> Result<Value> {
        match method {
            METHOD_SEND => {
                let text = incoming_text(params)?;
                let reply = self.router.dispatch(&text);
                Ok(serde_json::to_value(AgentMessage::agent_text(reply))?)
            }
            METHOD_CARD => Ok(serde_json::to_value(&self.card)?),
            other => Err(RpcError::MethodNotFound(other.to_string()).into()),
        }
    }
}

pub fn coordinator_service(router: Arc<Router>, url: impl Into<String>) -> RpcService {
    let handler = CoordinatorHandler::new(router, url);
    let card = handler.card().clone();
    RpcService::new(Arc::new(handler), card)
}
