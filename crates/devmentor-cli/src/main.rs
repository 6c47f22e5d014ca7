use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use devmentor_core::AppConfig;
use devmentor_errors::ErrorHandler;
use std::path::Path;

mod commands;
mod output;

use commands::admin::{run_config, run_personas};
use commands::ask::{run_ask, run_dispatch};
use commands::chat::run_chat;
use commands::diagnose::run_diagnose;
use commands::serve::{run_completions, run_serve};
use commands::tool::run_tool;

#[derive(Parser)]
#[command(name = "devmentor")]
#[command(about = "Multi-persona mentoring assistant for developers", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging to stderr.
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the tool server, the persona backends and the coordinator.
    Serve(ServeArgs),
    /// Interactive chat with one mentor.
    Chat(ChatArgs),
    /// Send one message to a persona and print the reply.
    Ask(AskArgs),
    /// Route a `persona_key:message` string like the coordinator does.
    Dispatch(DispatchArgs),
    /// Check which listeners are up.
    Diagnose(DiagnoseArgs),
    /// List the mentor personas.
    Personas,
    /// Run one of the mentoring tools.
    Tool(ToolArgs),
    /// Show the effective configuration.
    Config,
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    #[command(subcommand)]
    target: Option<ServeTarget>,
}

#[derive(Subcommand, Clone, Default)]
enum ServeTarget {
    /// Every listener in one process.
    #[default]
    All,
    /// A single persona backend.
    Persona { key: String },
    /// Only the coordinator.
    Coordinator,
    /// Only the tool server.
    Tools,
}

#[derive(Args, Default)]
struct ChatArgs {
    /// Persona to start with (defaults to router.default_persona).
    #[arg(long)]
    persona: Option<String>,
    /// Send every message through the coordinator as `key:text`.
    #[arg(long)]
    via_coordinator: bool,
}

#[derive(Args)]
struct AskArgs {
    persona: String,
    message: String,
}

#[derive(Args)]
struct DispatchArgs {
    message: String,
    #[arg(long)]
    via_coordinator: bool,
}

#[derive(Args)]
struct DiagnoseArgs {
    /// Include the tool server.
    #[arg(long)]
    tools: bool,
}

#[derive(Args)]
struct ToolArgs {
    name: String,
    /// Tool arguments as a JSON object.
    #[arg(long, default_value = "{}")]
    args: String,
    /// Call the running tool server instead of running the tool in-process.
    #[arg(long)]
    remote: bool,
}

#[derive(Args)]
struct CompletionsArgs {
    #[arg(value_enum)]
    shell: Shell,
}

fn main() -> Result<()> {
    let mut cli = Cli::parse();
    let cwd = std::env::current_dir()?;
    dotenvy::dotenv().ok();

    let cfg = AppConfig::load(&cwd)?;
    devmentor_observe::init_tracing(&cfg.logging, &cwd, cli.verbose)?;

    let command = cli
        .command
        .take()
        .unwrap_or(Commands::Chat(ChatArgs::default()));

    if let Err(err) = run(&cwd, &cfg, command, &cli) {
        eprintln!("{}", ErrorHandler::new().verbose(cli.verbose).handle(&err));
        std::process::exit(1);
    }
    Ok(())
}

fn run(cwd: &Path, cfg: &AppConfig, command: Commands, cli: &Cli) -> Result<()> {
    match command {
        Commands::Serve(args) => run_serve(cfg, args.target.unwrap_or_default(), cli.json),
        Commands::Chat(args) => run_chat(cfg, args, cli.verbose),
        Commands::Ask(args) => run_ask(cfg, args, cli.json),
        Commands::Dispatch(args) => run_dispatch(cfg, args, cli.json),
        Commands::Diagnose(args) => run_diagnose(cfg, args, cli.json),
        Commands::Personas => run_personas(cli.json),
        Commands::Tool(args) => run_tool(cfg, args, cli.json),
        Commands::Config => run_config(cwd, cfg, cli.json),
        Commands::Completions(args) => run_completions(args),
    }
}
