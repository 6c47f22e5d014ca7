use anyhow::Result;
use devmentor_core::AppConfig;
use devmentor_jsonrpc::protocol::AgentMessage;
use devmentor_personas::PersonaRegistry;
use devmentor_router::{AgentClient, AgentReply, HttpAgentClient, RouteOutcome, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::output::print_json;
use crate::{AskArgs, DispatchArgs};

pub(crate) fn coordinator_client(cfg: &AppConfig) -> Result<HttpAgentClient> {
    Ok(HttpAgentClient::new(
        cfg.network.coordinator_url(),
        Duration::from_secs(cfg.router.request_timeout_seconds),
    )?)
}

/// Sends `raw` to the coordinator. The coordinator answers routing failures
/// with `❌` text, so those count as failed outcomes too.
pub(crate) fn forward_via_coordinator(client: &dyn AgentClient, raw: &str) -> RouteOutcome {
    debug!("forwarding through the coordinator");
    match client.send(&AgentMessage::user_text(raw)) {
        Ok(AgentReply::Text(text)) if text.starts_with('❌') => RouteOutcome::Failed(text),
        Ok(AgentReply::Text(text)) => RouteOutcome::Reply(text),
        Ok(AgentReply::Opaque(value)) => RouteOutcome::Reply(value.to_string()),
        Ok(AgentReply::Error(remote)) => {
            RouteOutcome::Failed(format!("❌ Error communicating with the coordinator: {remote}"))
        }
        Err(err) => {
            RouteOutcome::Failed(format!("❌ Error communicating with the coordinator: {err}"))
        }
    }
}

pub(crate) fn run_ask(cfg: &AppConfig, args: AskArgs, json_mode: bool) -> Result<()> {
    let router = Router::http(Arc::new(PersonaRegistry::builtin()), cfg);
    let outcome = router.route_outcome(&args.persona, &args.message);
    emit(&args.persona, outcome, json_mode)
}

pub(crate) fn run_dispatch(cfg: &AppConfig, args: DispatchArgs, json_mode: bool) -> Result<()> {
    if args.via_coordinator {
        let client = coordinator_client(cfg)?;
        let outcome = forward_via_coordinator(&client, &args.message);
        return emit("coordinator", outcome, json_mode);
    }
    let router = Router::http(Arc::new(PersonaRegistry::builtin()), cfg);
    let outcome = router.dispatch_outcome(&args.message);
    emit("dispatch", outcome, json_mode)
}

fn emit(target: &str, outcome: RouteOutcome, json_mode: bool) -> Result<()> {
    if json_mode {
        return print_json(&json!({
            "target": target,
            "ok": !outcome.is_failure(),
            "reply": outcome.text(),
        }));
    }
    println!("{}", outcome.text());
    Ok(())
}
