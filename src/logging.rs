//! `tracing` subscriber setup.
//!
//! Headless modes log to stderr; the TUI owns the terminal, so it only logs
//! when given a file.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_DIRECTIVE: &str = "matchsim_cli=info";

pub enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
    Off,
}

/// `--log-level` beats `RUST_LOG`, which beats the default directive.
pub fn build_filter(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        Some(level) => EnvFilter::try_new(directive_for(level))
            .with_context(|| format!("invalid log level: {level}")),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))),
    }
}

/// A bare level applies to this crate only; anything else is passed through.
fn directive_for(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("matchsim_cli={level}")
    }
}

pub fn init(level: Option<&str>, target: LogTarget<'_>) -> Result<()> {
    let filter = build_filter(level)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let res = match target {
        LogTarget::Off => return Ok(()),
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogTarget::File(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("create log directory {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };
    res.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

/// Where `--log-file` without a value points.
pub fn default_log_path() -> Option<std::path::PathBuf> {
    dirs::cache_dir().map(|d| d.join("matchsim-cli").join("matchsim.log"))
}
