use anyhow::{Result, anyhow};
use devmentor_core::LoggingConfig;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "DEVMENTOR_LOG";

// HTTP client internals are noisy at debug.
const QUIET_DEPENDENCIES: &str = "hyper=warn,hyper_util=warn,reqwest=info";

/// The filter directive in effect: `-v` forces debug, then `DEVMENTOR_LOG`,
/// then the configured level.
pub fn filter_directive(level: &str, env_override: Option<&str>, verbose: bool) -> String {
    let base = if verbose {
        "debug"
    } else {
        env_override
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(level)
    };
    if base.contains('=') {
        base.to_string()
    } else {
        format!("{base},{QUIET_DEPENDENCIES}")
    }
}

/// Relative log paths are placed under the workspace.
pub fn resolve_log_path(workspace: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        workspace.join(file)
    }
}

/// Installs the global fmt subscriber: stderr, or an append-mode file when
/// `logging.file` is set.
pub fn init_tracing(cfg: &LoggingConfig, workspace: &Path, verbose: bool) -> Result<()> {
    let env_override = std::env::var(LOG_ENV).ok();
    let directive = filter_directive(&cfg.level, env_override.as_deref(), verbose);
    let filter = EnvFilter::try_new(&directive)
        .map_err(|err| anyhow!("invalid log filter '{directive}': {err}"))?;

    match &cfg.file {
        Some(file) => {
            let path = resolve_log_path(workspace, file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|err| anyhow!("failed to install log subscriber: {err}"))
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(cfg.ansi)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| anyhow!("failed to install log subscriber: {err}")),
    }
}
