use anyhow::{Context, Result};

use crate::core::config::SyncConfig;
use crate::core::import::{ImportEngine, ImportSummary};
use crate::core::terminal::{GuideSection, print_success, print_warn};

fn backup_count(count: Option<usize>) -> String {
    count.map_or_else(|| "no backup".to_string(), |n| n.to_string())
}

fn print_import_summary(summary: &ImportSummary) {
    if !summary.remote_enabled {
        print_warn("Remote sync is not configured; nothing was imported.");
        return;
    }
    if !summary.reachable {
        print_warn("Remote store unreachable; nothing was imported.");
        return;
    }

    GuideSection::new("Import")
        .status(
            "Workflows",
            &format!(
                "{} restored (backup lists {})",
                summary.workflows_restored,
                backup_count(summary.workflows_in_backup)
            ),
        )
        .status(
            "Configs",
            &format!(
                "{} restored (backup lists {})",
                summary.configs_restored,
                backup_count(summary.configs_in_backup)
            ),
        )
        .print();
    if summary.fetch_failures > 0 {
        print_warn(&format!(
            "{} remote table(s) could not be read; see the log for details.",
            summary.fetch_failures
        ));
    } else {
        print_success("Import complete.");
    }
}

pub async fn run_import(config: &SyncConfig) -> Result<()> {
    let summary = ImportEngine::new(config)
        .run()
        .await
        .context("Import failed")?;
    print_import_summary(&summary);
    Ok(())
}
