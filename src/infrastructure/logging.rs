//! Logging system configuration and initialization
//!
//! Structured logging for the sync backend:
//! - console output for interactive runs
//! - optional non-blocking file output for scheduled runs
//! - log level + per-module filters taken from the configuration file,
//!   overridable with `RUST_LOG`
//! - CST (China Standard Time, UTC+8) timestamps, matching the platform

use anyhow::{anyhow, Result};
use chrono::{FixedOffset, Utc};
use lazy_static::lazy_static;
use std::sync::Mutex;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub use crate::infrastructure::config::LoggingConfig;

// Global guards keep the non-blocking log writers alive for the process.
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// Timestamp formatter for CST (UTC+8)
#[derive(Clone, Copy)]
struct CstTimeFormatter;

impl FormatTime for CstTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let cst_offset = FixedOffset::east_opt(8 * 3600).expect("valid offset");
        let cst_time = Utc::now().with_timezone(&cst_offset);
        write!(w, "{}", cst_time.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Initialize the logging system with default configuration.
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize the logging system from the application configuration.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(config)?;

    let console_layer = config
        .console_output
        .then(|| fmt::layer().with_timer(CstTimeFormatter).with_target(true));

    let file_layer = if config.file_output {
        std::fs::create_dir_all(&config.log_dir)
            .map_err(|e| anyhow!("Failed to create log directory: {e}"))?;
        let appender = rolling::never(&config.log_dir, "tenant-sync.log");
        let (writer, guard) = non_blocking(appender);
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard mutex poisoned"))?
            .push(guard);
        Some(
            fmt::layer()
                .with_timer(CstTimeFormatter)
                .with_ansi(false)
                .with_writer(writer),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;

    Ok(())
}

/// Build the level filter: `RUST_LOG` wins, otherwise the configured level
/// plus per-module directives.
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::try_from_default_env()
            .map_err(|e| anyhow!("Invalid RUST_LOG filter: {e}"));
    }

    let mut directives = vec![config.level.clone()];
    for (module, level) in &config.module_filters {
        directives.push(format!("{module}={level}"));
    }
    EnvFilter::try_new(directives.join(","))
        .map_err(|e| anyhow!("Invalid log filter from configuration: {e}"))
}
