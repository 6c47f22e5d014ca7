use anyhow::Result;
use devmentor_core::AppConfig;
use devmentor_personas::PersonaRegistry;
use std::path::Path;

use crate::output::{print_json, print_json_pretty};

pub(crate) fn run_personas(json_mode: bool) -> Result<()> {
    let registry = PersonaRegistry::builtin();
    if json_mode {
        return print_json(&registry.all());
    }
    for persona in registry.all() {
        println!(
            "{:<20} port {}  {}",
            persona.key, persona.port, persona.display_name
        );
        println!("{:<20} {}", "", persona.description);
    }
    Ok(())
}

pub(crate) fn run_config(workspace: &Path, cfg: &AppConfig, json_mode: bool) -> Result<()> {
    let redacted = cfg.redacted()?;
    if json_mode {
        return print_json(&redacted);
    }
    println!("Settings files (later entries win):");
    let paths = std::iter::once(AppConfig::legacy_toml_path(workspace))
        .chain(AppConfig::user_settings_path())
        .chain([
            AppConfig::project_settings_path(workspace),
            AppConfig::project_local_settings_path(workspace),
        ]);
    for path in paths {
        let marker = if path.exists() { "" } else { " (missing)" };
        println!("  {}{marker}", path.display());
    }
    println!(
        "API key: {}",
        match cfg.llm.resolve_api_key() {
            Some(_) => "set",
            None => "not set",
        }
    );
    println!();
    print_json_pretty(&redacted)
}
