//! Routes a user message to the persona backend that owns it.
//!
//! Routing never fails from the caller's point of view: remote errors and
//! transport failures come back as user-facing strings that start with `❌`.
//! [`Router::route_outcome`] keeps the success/failure distinction for
//! callers that need it (the chat front-end retracts unanswered turns).

use devmentor_core::{AppConfig, NetworkConfig, RouterConfig, UnknownPersonaPolicy};
use devmentor_jsonrpc::protocol::AgentMessage;
use devmentor_personas::{PersonaDescriptor, PersonaRegistry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

mod coordinator;
mod transport;

pub use coordinator::{COORDINATOR_NAME, CoordinatorHandler, coordinator_service};
pub use transport::{
    AgentClient, AgentConnector, AgentReply, HttpAgentClient, HttpConnector, TransportError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Reply(String),
    Failed(String),
}

impl RouteOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Reply(text) | Self::Failed(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Reply(text) | Self::Failed(text) => text,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Splits `"persona_key:text"` when the prefix is a registered key.
///
/// Anything else, including text whose prefix before the first `:` is not a
/// key, goes whole to `default_key`.
pub fn parse_dispatch<'a>(
    raw: &'a str,
    registry: &PersonaRegistry,
    default_key: &'a str,
) -> (&'a str, &'a str) {
    if let Some((prefix, rest)) = raw.split_once(':')
        && registry.contains(prefix)
    {
        return (prefix, rest.trim());
    }
    (default_key, raw)
}

pub struct Router {
    registry: Arc<PersonaRegistry>,
    network: NetworkConfig,
    default_persona: String,
    unknown_persona: UnknownPersonaPolicy,
    connector: Arc<dyn AgentConnector>,
    clients: Mutex<HashMap<String, Arc<dyn AgentClient>>>,
}

impl Router {
    pub fn new(
        registry: Arc<PersonaRegistry>,
        network: NetworkConfig,
        cfg: &RouterConfig,
        connector: Arc<dyn AgentConnector>,
    ) -> Self {
        Self {
            registry,
            network,
            default_persona: cfg.default_persona.clone(),
            unknown_persona: cfg.unknown_persona,
            connector,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// A router that talks JSON-RPC over HTTP to the configured host.
    pub fn http(registry: Arc<PersonaRegistry>, cfg: &AppConfig) -> Self {
        let connector = HttpConnector::new(Duration::from_secs(cfg.router.request_timeout_seconds));
        Self::new(registry, cfg.network.clone(), &cfg.router, Arc::new(connector))
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    pub fn default_persona(&self) -> &str {
        &self.default_persona
    }

    /// The persona a key routes to under the unknown-key policy.
    pub fn resolve(&self, persona_key: &str) -> Option<&PersonaDescriptor> {
        match self.registry.get(persona_key) {
            Ok(persona) => Some(persona),
            Err(_) if self.unknown_persona == UnknownPersonaPolicy::Fallback => {
                self.registry.get(&self.default_persona).ok()
            }
            Err(_) => None,
        }
    }

    pub fn route(&self, persona_key: &str, message: &str) -> String {
        self.route_outcome(persona_key, message).into_text()
    }

    pub fn route_outcome(&self, persona_key: &str, message: &str) -> RouteOutcome {
        let Some(persona) = self.resolve(persona_key) else {
            warn!(persona = persona_key, "rejected unknown persona");
            return RouteOutcome::Failed(format!(
                "❌ Unknown persona '{persona_key}'. Known personas: {}",
                self.registry.keys().collect::<Vec<_>>().join(", ")
            ));
        };
        if persona.key != persona_key {
            info!(
                requested = persona_key,
                persona = %persona.key,
                "unknown persona, using default"
            );
        }
        info!(persona = %persona.key, port = persona.port, "routing message");
        debug!(
            persona = persona_key,
            "message: {}",
            message.chars().take(100).collect::<String>()
        );

        let reply = self
            .client_for(persona)
            .and_then(|client| client.send(&AgentMessage::user_text(message)));
        match reply {
            Ok(AgentReply::Text(text)) => {
                info!(persona = persona_key, chars = text.chars().count(), "reply received");
                RouteOutcome::Reply(text)
            }
            Ok(AgentReply::Opaque(value)) => {
                let text = value.to_string();
                info!(persona = persona_key, chars = text.chars().count(), "opaque reply received");
                RouteOutcome::Reply(text)
            }
            Ok(AgentReply::Error(remote)) => {
                error!(persona = persona_key, "agent answered with an error: {remote}");
                RouteOutcome::Failed(format!(
                    "❌ Error communicating with agent {persona_key}: {remote}"
                ))
            }
            Err(err) => {
                error!(persona = persona_key, "transport failure: {err}");
                RouteOutcome::Failed(format!(
                    "❌ Error communicating with agent {persona_key}: {err}"
                ))
            }
        }
    }

    /// Routes `"persona_key:text"` to that persona, anything else to the default.
    pub fn dispatch(&self, raw: &str) -> String {
        self.dispatch_outcome(raw).into_text()
    }

    pub fn dispatch_outcome(&self, raw: &str) -> RouteOutcome {
        let (persona_key, text) = parse_dispatch(raw, &self.registry, &self.default_persona);
        debug!(persona = persona_key, "dispatching");
        self.route_outcome(persona_key, text)
    }

    pub fn cached_clients(&self) -> usize {
        self.clients.lock().map(|clients| clients.len()).unwrap_or(0)
    }

    fn client_for(&self, persona: &PersonaDescriptor) -> Result<Arc<dyn AgentClient>, TransportError> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| TransportError::Unknown("client cache lock poisoned".to_string()))?;
        if let Some(client) = clients.get(&persona.key) {
            return Ok(Arc::clone(client));
        }
        let base_url = self.network.base_url(persona.port);
        info!(persona = %persona.key, %base_url, "creating agent client");
        let client = self.connector.connect(&base_url)?;
        clients.insert(persona.key.clone(), Arc::clone(&client));
        Ok(client)
    }
}
