//! Statsheet Harvester binary
//!
//! Usage: `statsheet-harvester [CONFIG_PATH]`. Without a path the file in the
//! user config directory is used (created with defaults on first run).

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use statsheet_harvester_lib::domain::AuditStatus;
use statsheet_harvester_lib::infrastructure::logging::log_system_info;
use statsheet_harvester_lib::infrastructure::{ConfigManager, init_logging_with_config};

#[tokio::main]
async fn main() -> Result<()> {
    let manager = match std::env::args().nth(1) {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let config = manager
        .load_validated()
        .await
        .with_context(|| format!("Failed to load configuration from {:?}", manager.config_path()))?;

    let _logging = init_logging_with_config(&config.logging)?;
    log_system_info();
    info!("🔧 Configuration: {:?}", manager.config_path());

    let cancellation_token = CancellationToken::new();
    let on_signal = cancellation_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 Ctrl-C received; finishing in-flight work units");
                on_signal.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let report = statsheet_harvester_lib::run(&config, cancellation_token).await?;

    for (status, count) in report.status_counts() {
        info!("📊 {:<18} {}", status.as_str(), count);
    }
    if report.count(AuditStatus::Success) < report.records.len() {
        warn!("⚠️ Some targets failed; see the audit table for details");
    }
    Ok(())
}
