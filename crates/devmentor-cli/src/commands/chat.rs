use anyhow::Result;
use devmentor_core::AppConfig;
use devmentor_errors::errors;
use devmentor_health::{DiagnosticSummary, HealthChecker, format_report};
use devmentor_personas::PersonaRegistry;
use devmentor_router::{HttpAgentClient, RouteOutcome, Router};
use devmentor_ui::{
    ChatSession, ChatStatus, HELP_TEXT, SlashCommand, render_history, render_statusline,
};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{debug, info};

use crate::ChatArgs;
use crate::commands::ask::{coordinator_client, forward_via_coordinator};
use crate::commands::diagnose::sweep;

struct ChatContext<'a> {
    cfg: &'a AppConfig,
    registry: Arc<PersonaRegistry>,
    router: Router,
    checker: HealthChecker,
    coordinator: Option<HttpAgentClient>,
    verbose: bool,
}

pub(crate) fn run_chat(cfg: &AppConfig, args: ChatArgs, verbose: bool) -> Result<()> {
    let registry = Arc::new(PersonaRegistry::builtin());
    let persona = args
        .persona
        .unwrap_or_else(|| cfg.router.default_persona.clone());
    ensure_known(&registry, &persona)?;

    let ctx = ChatContext {
        cfg,
        router: Router::http(Arc::clone(&registry), cfg),
        registry,
        checker: crate::commands::diagnose::checker(cfg)?,
        coordinator: if args.via_coordinator {
            Some(coordinator_client(cfg)?)
        } else {
            None
        },
        verbose,
    };

    let mut session = ChatSession::new(persona);
    println!("DevMentor chat. Type /help for commands.");
    print_status(&ctx, &session);

    let stdin = io::stdin();
    run_loop(&ctx, &mut session, stdin.lock())
}

fn ensure_known(registry: &PersonaRegistry, key: &str) -> Result<()> {
    if registry.contains(key) {
        return Ok(());
    }
    let known = registry.keys().collect::<Vec<_>>();
    Err(errors::unknown_persona(key, &known).into_error())
}

fn run_loop<R: BufRead>(ctx: &ChatContext<'_>, session: &mut ChatSession, input: R) -> Result<()> {
    let mut lines = input.lines();
    loop {
        print!("{}> ", session.persona());
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(command) = SlashCommand::parse(trimmed) {
            if handle_command(ctx, session, command)? {
                break;
            }
            continue;
        }
        send_message(ctx, session, trimmed);
    }
    info!(turns = session.turns().len(), "chat finished");
    Ok(())
}

/// Returns `true` when the chat should end.
fn handle_command(ctx: &ChatContext<'_>, session: &mut ChatSession, command: SlashCommand) -> Result<bool> {
    match command {
        SlashCommand::Help => println!("{HELP_TEXT}"),
        SlashCommand::Personas => {
            for persona in ctx.registry.all() {
                let marker = if persona.key == session.persona() { "*" } else { " " };
                println!("{marker} {:<20} {}", persona.key, persona.display_name);
            }
        }
        SlashCommand::Persona(None) => print_status(ctx, session),
        SlashCommand::Persona(Some(key)) => match ensure_known(&ctx.registry, &key) {
            Ok(()) => {
                session.set_persona(key);
                print_status(ctx, session);
            }
            Err(err) => eprintln!("{err}"),
        },
        SlashCommand::Clear => {
            session.clear();
            println!("Conversation cleared.");
        }
        SlashCommand::History => println!("{}", render_history(session.turns())),
        SlashCommand::Diagnose => {
            let result = sweep(ctx.cfg, &ctx.registry, true)?;
            println!("{}", result.table());
            println!("{}/{} listeners healthy", result.healthy(), result.total());
        }
        SlashCommand::Exit => return Ok(true),
        SlashCommand::Unknown { name, .. } => {
            eprintln!("Unknown command /{name}. Type /help for the list.");
        }
    }
    Ok(false)
}

fn send_message(ctx: &ChatContext<'_>, session: &mut ChatSession, text: &str) {
    let Ok(persona) = ctx.registry.get(session.persona()) else {
        return;
    };
    let (key, port) = (persona.key.clone(), persona.port);
    session.push_user(text);

    let record = ctx.checker.diagnose_target(port, None);
    if !record.port_open {
        let cause = record
            .port_error
            .as_deref()
            .unwrap_or("connection refused");
        eprintln!("{}", errors::server_not_running(port, cause).format(true));
        session.retract_pending_user();
        return;
    }
    if !record.is_healthy() {
        eprintln!(
            "⚠️  {key} on port {port}: {}. Trying anyway.",
            record.overall_status.label()
        );
    }

    let outcome = match &ctx.coordinator {
        Some(client) => forward_via_coordinator(client, &format!("{key}:{text}")),
        None => ctx.router.route_outcome(&key, text),
    };
    match outcome {
        RouteOutcome::Reply(reply) => {
            println!("\n{reply}\n");
            session.push_assistant(reply);
        }
        RouteOutcome::Failed(message) => {
            debug!(persona = %key, "reply failed, retracting turn");
            eprintln!("{}", errors::agent_error(port, &message).format(ctx.verbose));
            let report = DiagnosticSummary::single(&key, ctx.checker.diagnose_target(port, None));
            eprintln!("{}", format_report(&report));
            session.retract_pending_user();
        }
    }
}

fn print_status(ctx: &ChatContext<'_>, session: &ChatSession) {
    let port = ctx
        .registry
        .get(session.persona())
        .map(|persona| persona.port)
        .unwrap_or_default();
    println!(
        "[{}]",
        render_statusline(&ChatStatus {
            persona: session.persona().to_string(),
            port,
            turns: session.turns().len(),
            via_coordinator: ctx.coordinator.is_some(),
        })
    );
}
