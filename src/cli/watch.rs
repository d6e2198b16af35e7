use anyhow::{Context, Result};
use tracing::info;

use crate::cli::export::print_export_summary;
use crate::core::config::SyncConfig;
use crate::core::export::ExportEngine;
use crate::core::shutdown::{ShutdownCoordinator, TriggerOutcome};
use crate::core::terminal::{GuideSection, print_warn};
use crate::platform::{NativePlatform, Platform};

/// Parks until the process is asked to stop, flushes one export and returns.
pub async fn run_watch(config: &SyncConfig) -> Result<()> {
    tokio::fs::create_dir_all(&config.document_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.document_dir.display()))?;

    let mut signals =
        NativePlatform::shutdown_signals().context("Failed to install signal handlers")?;
    let coordinator = ShutdownCoordinator::new(ExportEngine::new(config));

    GuideSection::new("Watch")
        .status("Documents", &config.document_dir.display().to_string())
        .status("Backups", &config.backup_dir.display().to_string())
        .status("Signals", &NativePlatform::shutdown_signal_names().join(", "))
        .print();
    info!("Waiting for shutdown signal");

    match coordinator.run_until_signal(&mut signals).await {
        TriggerOutcome::Completed(summary) => print_export_summary(&summary),
        TriggerOutcome::AlreadyRunning => print_warn("An export was already running."),
    }
    info!("Exiting after final export");
    Ok(())
}
