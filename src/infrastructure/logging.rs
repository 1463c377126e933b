//! Logging system configuration and initialization
//!
//! - Console output, plain or JSON
//! - Daily rolling log file through a non-blocking writer
//! - Level taken from the configuration file, overridable with `RUST_LOG`
//! - Dependency chatter (`sqlx`, `reqwest`, `hyper`, html parsing) capped at
//!   `warn` unless the level is `trace`
//!
//! `init_logging_with_config` returns a `LoggingGuard`; keep it alive for the
//! lifetime of the process or buffered file output is lost.

use anyhow::{Result, anyhow};
use chrono::Utc;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::ConfigManager;

/// Targets held at `warn` unless tracing everything
const NOISY_TARGETS: [&str; 6] = ["sqlx", "reqwest", "hyper", "h2", "html5ever", "selectors"];

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// UTC timestamps with millisecond precision
struct UtcTimeFormatter;

impl FormatTime for UtcTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%d %H:%M:%S%.3fZ"))
    }
}

/// Keeps the file writer flushing; dropping it stops file output
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug)]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Directory receiving log files, if file output is enabled
    #[must_use]
    pub fn log_dir(&self) -> Option<&PathBuf> {
        self.log_dir.as_ref()
    }
}

/// Get the log directory used when none is configured
#[must_use]
pub fn get_log_directory() -> PathBuf {
    ConfigManager::get_app_data_dir().map_or_else(
        |_| {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(std::path::Path::to_path_buf))
                .unwrap_or_default()
                .join("logs")
        },
        |dir| dir.join("logs"),
    )
}

/// Filter directives for `level`: the level itself plus dependency caps
#[must_use]
pub fn filter_directives(level: &str) -> Vec<String> {
    let level = level.trim().to_lowercase();
    let mut directives = vec![level.clone()];
    if level != "trace" {
        directives.extend(NOISY_TARGETS.iter().map(|target| format!("{target}=warn")));
    }
    directives
}

fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let mut filter = EnvFilter::new("");
    for directive in filter_directives(level) {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

/// Initialize logging with the default configuration
pub fn init_logging() -> Result<LoggingGuard> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Installs the global subscriber described by `config`.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<LoggingGuard> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let env_filter = build_env_filter(&config.level)?;
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.console_output {
        let console_layer: BoxedLayer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(std::io::stdout)
                .with_timer(UtcTimeFormatter)
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_timer(UtcTimeFormatter)
                .with_target(false)
                .boxed()
        };
        layers.push(console_layer);
    }

    let mut file_guard = None;
    let mut log_dir = None;
    if config.file_output {
        let dir = config.log_dir.clone().unwrap_or_else(get_log_directory);
        std::fs::create_dir_all(&dir).map_err(|e| anyhow!("Failed to create log directory {:?}: {}", dir, e))?;

        let file_appender = rolling::daily(&dir, format!("{}.log", config.file_prefix));
        let (file_writer, guard) = non_blocking(file_appender);
        let file_layer: BoxedLayer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_timer(UtcTimeFormatter)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(file_writer)
                .with_timer(UtcTimeFormatter)
                .with_target(true)
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
        file_guard = Some(guard);
        log_dir = Some(dir);
    }

    Registry::default()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {} (JSON: {})", config.level, config.json_format);
    if let Some(dir) = &log_dir {
        info!("Log directory: {:?}", dir);
    }
    if config.level.eq_ignore_ascii_case("trace") {
        info!("TRACE level active - dependency logs are not capped");
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
        log_dir,
    })
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== {} {} ===", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Operating system: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_trace_levels_cap_dependencies() {
        let directives = filter_directives("INFO");
        assert_eq!(directives[0], "info");
        assert!(directives.contains(&"sqlx=warn".to_string()));
        assert!(directives.contains(&"html5ever=warn".to_string()));
    }

    #[test]
    fn test_trace_level_is_uncapped() {
        assert_eq!(filter_directives("trace"), vec!["trace".to_string()]);
    }

    #[test]
    fn test_directives_parse() {
        for level in ["error", "warn", "info", "debug", "trace"] {
            assert!(build_env_filter(level).is_ok());
        }
    }

    #[test]
    fn test_no_output_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(&config).is_err());
    }

    #[test]
    fn test_log_directory_is_named_logs() {
        assert!(get_log_directory().ends_with("logs"));
    }
}
