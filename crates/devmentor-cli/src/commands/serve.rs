use anyhow::{Context, Result, anyhow};
use clap::CommandFactory;
use clap_complete::generate;
use devmentor_agent::{PersonaAgent, ToolRunner, persona_service};
use devmentor_core::{AppConfig, mask_secret};
use devmentor_errors::errors;
use devmentor_jsonrpc::{RpcService, serve_rpc};
use devmentor_llm::{LlmClient, OpenRouterClient};
use devmentor_personas::{PersonaDescriptor, PersonaRegistry};
use devmentor_router::{Router, coordinator_service};
use devmentor_tools::{ToolHost, ToolServerClient, ToolServerHandler, tool_server_service};
use serde_json::json;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::commands::diagnose::{COORDINATOR_LABEL, TOOL_SERVER_LABEL, sweep};
use crate::output::print_json;
use crate::{Cli, CompletionsArgs, ServeTarget};

pub(crate) fn run_completions(args: CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "devmentor", &mut io::stdout());
    Ok(())
}

/// One HTTP listener to bind, in startup order.
struct Listener {
    label: String,
    port: u16,
    service: RpcService,
}

/// Shared pieces the persona backends are built from.
struct Backends {
    registry: Arc<PersonaRegistry>,
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolRunner>,
}

impl Backends {
    fn new(cfg: &AppConfig) -> Result<Self> {
        let tools = ToolServerClient::new(
            cfg.network.tool_server_url(),
            Duration::from_secs(cfg.diagnostics.tool_call_timeout_seconds),
        )?;
        Ok(Self {
            registry: Arc::new(PersonaRegistry::builtin()),
            llm: Arc::new(OpenRouterClient::new(cfg.llm.clone())?),
            tools: Arc::new(tools),
        })
    }

    fn persona(&self, cfg: &AppConfig, persona: &PersonaDescriptor) -> Listener {
        let url = cfg.network.base_url(persona.port);
        let agent = PersonaAgent::new(
            persona.clone(),
            Arc::clone(&self.llm),
            Arc::clone(&self.tools),
            url,
        )
        .with_max_tool_rounds(cfg.llm.max_tool_rounds)
        .with_temperature(cfg.llm.temperature);
        Listener {
            label: persona.key.clone(),
            port: persona.port,
            service: persona_service(agent),
        }
    }
}

fn tool_listener(cfg: &AppConfig) -> Listener {
    Listener {
        label: TOOL_SERVER_LABEL.to_string(),
        port: cfg.network.tool_server_port,
        service: tool_server_service(
            ToolServerHandler::new(ToolHost::new()),
            cfg.network.tool_server_url(),
        ),
    }
}

fn coordinator_listener(cfg: &AppConfig, registry: Arc<PersonaRegistry>) -> Listener {
    let router = Arc::new(Router::http(registry, cfg));
    Listener {
        label: COORDINATOR_LABEL.to_string(),
        port: cfg.network.coordinator_port,
        service: coordinator_service(router, cfg.network.coordinator_url()),
    }
}

pub(crate) fn run_serve(cfg: &AppConfig, target: ServeTarget, json_mode: bool) -> Result<()> {
    let listeners = match &target {
        ServeTarget::All => {
            check_environment(cfg, json_mode);
            let backends = Backends::new(cfg)?;
            // Tool server first, then the personas, then the coordinator that
            // depends on them.
            let mut listeners = vec![tool_listener(cfg)];
            for persona in backends.registry.all() {
                listeners.push(backends.persona(cfg, persona));
            }
            listeners.push(coordinator_listener(cfg, Arc::clone(&backends.registry)));
            listeners
        }
        ServeTarget::Persona { key } => {
            let backends = Backends::new(cfg)?;
            let persona = backends.registry.get(key).map_err(|_| {
                let known = backends.registry.keys().collect::<Vec<_>>();
                errors::unknown_persona(key, &known).into_error()
            })?;
            if cfg.llm.resolve_api_key().is_none() {
                warn!("{} is not set; replies will fail", cfg.llm.api_key_env);
            }
            vec![backends.persona(cfg, persona)]
        }
        ServeTarget::Coordinator => vec![coordinator_listener(
            cfg,
            Arc::new(PersonaRegistry::builtin()),
        )],
        ServeTarget::Tools => vec![tool_listener(cfg)],
    };

    // The services own blocking HTTP clients, which must be dropped outside
    // the runtime.
    let retained = listeners
        .iter()
        .map(|listener| listener.service.clone())
        .collect::<Vec<_>>();

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(serve_listeners(
        cfg.clone(),
        listeners,
        matches!(target, ServeTarget::All),
        json_mode,
    ));
    drop(runtime);
    drop(retained);
    result
}

async fn serve_listeners(
    cfg: AppConfig,
    listeners: Vec<Listener>,
    startup_sweep: bool,
    json_mode: bool,
) -> Result<()> {
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();
    let mut bound = Vec::new();

    for listener in listeners {
        let addr = (cfg.network.bind_host.as_str(), listener.port);
        let socket = TcpListener::bind(addr).await.with_context(|| {
            format!(
                "failed to bind {} on {}:{}",
                listener.label, cfg.network.bind_host, listener.port
            )
        })?;
        info!(listener = %listener.label, port = listener.port, "bound");
        bound.push(json!({
            "name": listener.label,
            "port": listener.port,
            "url": cfg.network.base_url(listener.port),
        }));
        if !json_mode {
            println!(
                "🚀 {:<20} {}",
                listener.label,
                cfg.network.base_url(listener.port)
            );
        }

        let mut stop = stop_rx.clone();
        tasks.spawn(serve_rpc(socket, listener.service, async move {
            let _ = stop.changed().await;
        }));
    }

    if json_mode {
        print_json(&json!({"status": "listening", "listeners": bound}))?;
    }

    if startup_sweep {
        tokio::time::sleep(Duration::from_millis(cfg.diagnostics.settle_ms)).await;
        let sweep_cfg = cfg.clone();
        let report = tokio::task::spawn_blocking(move || {
            let registry = PersonaRegistry::builtin();
            sweep(&sweep_cfg, &registry, true)
        })
        .await??;

        if json_mode {
            print_json(&report)?;
        } else {
            println!("\n📊 Startup diagnostics");
            println!("{}", report.table());
            if report.all_healthy() {
                println!("✅ {}/{} listeners healthy", report.healthy(), report.total());
            } else {
                println!(
                    "⚠️  {}/{} listeners healthy (closed: {}, open without endpoint: {})",
                    report.healthy(),
                    report.total(),
                    report.closed(),
                    report.summary.summary.port_open_but_no_endpoint
                );
                println!("{}", report.report());
            }
        }
    }

    if !json_mode {
        println!("\nPress Ctrl-C to stop.");
    }

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("shutting down");
            Ok(())
        }
        Some(joined) = tasks.join_next() => match joined {
            Ok(Ok(())) => Err(anyhow!("a listener stopped unexpectedly")),
            Ok(Err(err)) => Err(err),
            Err(err) => Err(anyhow!("listener task failed: {err}")),
        },
    };

    let _ = stop_tx.send(true);
    while let Some(joined) = tasks.join_next().await {
        if let Ok(Err(err)) = joined {
            error!("listener failed during shutdown: {err:#}");
        }
    }
    outcome
}

fn check_environment(cfg: &AppConfig, json_mode: bool) {
    if json_mode {
        return;
    }
    println!("🔍 Checking environment");
    match cfg.llm.resolve_api_key() {
        Some(key) => println!("✅ {} set: {}", cfg.llm.api_key_env, mask_secret(&key)),
        None => println!("{}", errors::missing_api_key(&cfg.llm.api_key_env).format(false)),
    }
    println!("✅ model: {}", cfg.llm.model);
}
