use std::io;

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{config::AppConfig, infrastructure::directories::ResolvedPaths};

static INIT: OnceCell<()> = OnceCell::new();
static GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Targets emitted by this crate. Everything else (reqwest, hyper, the cron runtime) stays at warn.
const APP_TARGETS: &[&str] = &["app", "auth", "sync", "actions", "gmail", "classifier", "scheduler"];

/// Console output goes to stderr so the dashboard keeps stdout to itself.
pub fn init_tracing(config: &AppConfig, paths: &ResolvedPaths) -> Result<()> {
    INIT.get_or_try_init::<_, anyhow::Error>(|| {
        let directives = default_directives(&config.logging.level);
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&directives))
            .unwrap_or_else(|_| EnvFilter::new(default_directives("info")));

        let file_appender = tracing_appender::rolling::daily(&paths.logs_dir, "spam-sniffer.log");
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        let _ = GUARD.set(guard);

        let console_layer = fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_target(true)
            .with_ansi(true);

        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_line_number(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        tracing::info!(target: "app", logs = %paths.logs_dir.display(), filter = %directives, "tracing initialized");
        Ok(())
    })?;
    Ok(())
}

/// A bare level applies to this crate's targets only; anything with directive syntax is used as is.
fn default_directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let level = if level.is_empty() { "info" } else { level };
    let mut directives = String::from("warn");
    for target in APP_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}
