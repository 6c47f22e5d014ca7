use anyhow::Result;
use devmentor_core::AppConfig;
use devmentor_health::{DiagnosticSummary, HealthChecker, HealthRecord, format_report};
use devmentor_personas::PersonaRegistry;
use serde::Serialize;

use crate::DiagnoseArgs;
use crate::output::print_json;

pub(crate) const TOOL_SERVER_LABEL: &str = "tool_server";
pub(crate) const COORDINATOR_LABEL: &str = "coordinator";

#[derive(Debug, Serialize)]
pub(crate) struct Sweep {
    #[serde(flatten)]
    pub summary: DiagnosticSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_server: Option<HealthRecord>,
}

impl Sweep {
    pub fn total(&self) -> usize {
        self.summary.summary.total + usize::from(self.tool_server.is_some())
    }

    pub fn healthy(&self) -> usize {
        self.summary.summary.healthy
            + usize::from(self.tool_server.as_ref().is_some_and(HealthRecord::is_healthy))
    }

    pub fn closed(&self) -> usize {
        self.summary.summary.port_closed
            + usize::from(self.tool_server.as_ref().is_some_and(|record| !record.port_open))
    }

    pub fn all_healthy(&self) -> bool {
        self.healthy() == self.total()
    }

    /// One line per listener, tool server first.
    pub fn table(&self) -> String {
        let mut lines = Vec::new();
        if let Some(record) = &self.tool_server {
            lines.push(row(TOOL_SERVER_LABEL, record));
        }
        for (name, record) in &self.summary.servers {
            lines.push(row(name, record));
        }
        lines.join("\n")
    }

    pub fn report(&self) -> String {
        let mut out = String::new();
        if let Some(record) = &self.tool_server {
            out.push_str(&format_report(&DiagnosticSummary::single(
                TOOL_SERVER_LABEL,
                record.clone(),
            )));
        }
        out.push_str(&format_report(&self.summary));
        out
    }
}

fn row(name: &str, record: &HealthRecord) -> String {
    format!(
        "  {name:<20} port {:<5} {}",
        record.port,
        record.overall_status.label()
    )
}

pub(crate) fn checker(cfg: &AppConfig) -> Result<HealthChecker> {
    Ok(HealthChecker::new(&cfg.diagnostics)?.with_host(cfg.network.host.clone()))
}

/// The personas plus the coordinator, in startup order.
pub(crate) fn sweep_targets(cfg: &AppConfig, registry: &PersonaRegistry) -> Vec<(String, u16)> {
    registry
        .all()
        .iter()
        .map(|persona| (persona.key.clone(), persona.port))
        .chain(std::iter::once((
            COORDINATOR_LABEL.to_string(),
            cfg.network.coordinator_port,
        )))
        .collect()
}

pub(crate) fn sweep(cfg: &AppConfig, registry: &PersonaRegistry, include_tools: bool) -> Result<Sweep> {
    let checker = checker(cfg)?;
    let tool_server =
        include_tools.then(|| checker.diagnose_tool_server(cfg.network.tool_server_port, None));
    let summary = checker.diagnose_many(&sweep_targets(cfg, registry));
    Ok(Sweep {
        summary,
        tool_server,
    })
}

pub(crate) fn run_diagnose(cfg: &AppConfig, args: DiagnoseArgs, json_mode: bool) -> Result<()> {
    let registry = PersonaRegistry::builtin();
    let result = sweep(cfg, &registry, args.tools)?;
    if json_mode {
        return print_json(&result);
    }

    println!("{}", result.report());
    println!("{}", result.table());
    if result.all_healthy() {
        println!("\n✅ {}/{} listeners healthy", result.healthy(), result.total());
    } else {
        println!(
            "\n⚠️  {}/{} listeners healthy (closed: {}, open without endpoint: {})",
            result.healthy(),
            result.total(),
            result.closed(),
            result.summary.summary.port_open_but_no_endpoint
        );
        println!("   Start them with `devmentor serve`.");
    }
    Ok(())
}
