use anyhow::Result;

use crate::core::config::SyncConfig;
use crate::core::export::{ExportEngine, ExportSummary};
use crate::core::terminal::{GuideSection, print_success, print_warn};

pub(super) fn print_export_summary(summary: &ExportSummary) {
    let remote = if summary.remote_enabled {
        format!(
            "{} created, {} updated, {} failed",
            summary.remote.created, summary.remote.updated, summary.remote.failed
        )
    } else {
        "disabled".to_string()
    };

    GuideSection::new("Export")
        .status("Workflows", &summary.workflows_exported.to_string())
        .status("Configs", &summary.configs_exported.to_string())
        .status("Remote", &remote)
        .status("Backups", &summary.local_backup_dir.display().to_string())
        .print();

    if summary.remote.failed > 0 {
        print_warn("Some documents were not stored remotely; see the log for details.");
    } else {
        print_success("Export complete.");
    }
}

/// Export never fails the process; problems are in the log and the summary.
pub async fn run_export(config: &SyncConfig) -> Result<()> {
    let summary = ExportEngine::new(config).run().await;
    print_export_summary(&summary);
    Ok(())
}
