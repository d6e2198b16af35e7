use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Component, Path};
use tokio::fs;
use tracing::{error, info, warn};

use crate::core::config::{ENGINE_CONFIG_KEY, SyncConfig};
use crate::core::document::{ConfigRow, WorkflowRow};
use crate::core::remote::{Method, RestClient};
use crate::core::snapshot::{SnapshotCategory, SnapshotStore};
use crate::platform::{NativePlatform, Platform};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub remote_enabled: bool,
    pub reachable: bool,
    pub workflows_in_backup: Option<usize>,
    pub workflows_restored: usize,
    pub configs_in_backup: Option<usize>,
    pub configs_restored: usize,
    /// Categories whose remote read failed or returned something other
    /// than a row list.
    pub fetch_failures: usize,
}

/// Restores the document tree from the remote store. The local stable
/// backups only gate which categories are fetched and report counts; the
/// remote rows are the data source.
pub struct ImportEngine {
    config: SyncConfig,
    remote: Option<RestClient>,
    snapshots: SnapshotStore,
}

/// Rejects names that would place a restored file outside the tree.
fn is_safe_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.trim().is_empty()
        && !name.contains(['/', '\\'])
        && path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Config rows carry the file's raw text; anything else is written as JSON.
fn raw_content(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ImportEngine {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            remote: RestClient::from_config(config),
            snapshots: SnapshotStore::new(&config.backup_dir),
            config: config.clone(),
        }
    }

    pub async fn run(&self) -> Result<ImportSummary> {
        info!("Starting import into {}", self.config.document_dir.display());
        self.snapshots.ensure_dir().await?;

        let mut summary = ImportSummary::default();
        let Some(client) = &self.remote else {
            info!("Remote sync disabled; nothing to import");
            return Ok(summary);
        };
        summary.remote_enabled = true;

        match client.ping().await {
            Ok(true) => info!("Remote store reachable at {}", client.settings().base_url),
            Ok(false) => {
                warn!("Remote store did not answer the health check; import skipped");
                return Ok(summary);
            }
            Err(e) => {
                warn!("Remote store unreachable, import skipped: {:#}", e);
                return Ok(summary);
            }
        }
        summary.reachable = true;

        self.import_workflows(client, &mut summary).await?;
        self.import_configs(client, &mut summary).await?;

        info!(
            workflows = summary.workflows_restored,
            configs = summary.configs_restored,
            fetch_failures = summary.fetch_failures,
            "Import finished"
        );
        Ok(summary)
    }

    async fn import_workflows(&self, client: &RestClient, summary: &mut ImportSummary) -> Result<()> {
        let backup = match self.snapshots.read_stable(SnapshotCategory::Workflows).await {
            Ok(Some(backup)) => backup,
            Ok(None) => {
                info!("No workflow backup found; skipping workflows");
                return Ok(());
            }
            Err(e) => {
                error!("Unusable workflow backup: {:#}", e);
                return Ok(());
            }
        };
        let in_backup = backup
            .get("workflows")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        summary.workflows_in_backup = Some(in_backup);

        let table = &client.settings().workflow_table;
        let res = match client.send(Method::GET, &client.table_url(table), None).await {
            Ok(res) => res,
            Err(e) => {
                warn!("Failed to fetch workflows: {:#}", e);
                summary.fetch_failures += 1;
                return Ok(());
            }
        };

        match (res.status, res.body.rows()) {
            (200, Some(rows)) if !rows.is_empty() => {
                info!("Restoring {} workflow(s) from the remote store", rows.len());
                fs::create_dir_all(&self.config.document_dir)
                    .await
                    .with_context(|| {
                        format!("failed to create {}", self.config.document_dir.display())
                    })?;
                for row in rows {
                    if self.restore_workflow(row).await {
                        summary.workflows_restored += 1;
                    }
                }
            }
            (200, Some(_)) | (404, _) => info!("No remote workflows to restore"),
            (status, _) => {
                warn!(status, body = %res.body, "Failed to fetch workflows");
                summary.fetch_failures += 1;
            }
        }

        info!("Workflow backup lists {} workflow(s)", in_backup);
        Ok(())
    }

    async fn restore_workflow(&self, row: &Value) -> bool {
        let row: WorkflowRow = match serde_json::from_value(row.clone()) {
            Ok(row) => row,
            Err(e) => {
                warn!("Skipping malformed workflow row: {}", e);
                return false;
            }
        };
        if !is_safe_name(&row.name) {
            warn!(name = %row.name, "Skipping workflow with unsafe name");
            return false;
        }

        let path = self.config.document_dir.join(format!("{}.json", row.name));
        let content = match serde_json::to_string_pretty(&row.data) {
            Ok(content) => content,
            Err(e) => {
                warn!(name = %row.name, "Failed to serialize workflow: {}", e);
                return false;
            }
        };
        match fs::write(&path, content).await {
            Ok(()) => {
                info!(
                    name = %row.name,
                    updated_at = row.updated_at.as_deref().unwrap_or("unknown"),
                    "Workflow restored"
                );
                true
            }
            Err(e) => {
                warn!(name = %row.name, "Failed to restore workflow: {}", e);
                false
            }
        }
    }

    async fn import_configs(&self, client: &RestClient, summary: &mut ImportSummary) -> Result<()> {
        let backup = match self.snapshots.read_stable(SnapshotCategory::Config).await {
            Ok(Some(backup)) => backup,
            Ok(None) => {
                info!("No config backup found; skipping configuration");
                return Ok(());
            }
            Err(e) => {
                error!("Unusable config backup: {:#}", e);
                return Ok(());
            }
        };
        let in_backup = backup.as_object().map_or(0, |m| m.len());
        summary.configs_in_backup = Some(in_backup);

        let table = &client.settings().config_table;
        let res = match client.send(Method::GET, &client.table_url(table), None).await {
            Ok(res) => res,
            Err(e) => {
                warn!("Failed to fetch configuration: {:#}", e);
                summary.fetch_failures += 1;
                return Ok(());
            }
        };

        match (res.status, res.body.rows()) {
            (200, Some(rows)) if !rows.is_empty() => {
                info!("Restoring configuration from {} remote row(s)", rows.len());
                for row in rows {
                    if self.restore_config(row).await {
                        summary.configs_restored += 1;
                    }
                }
            }
            (200, Some(_)) | (404, _) => info!("No remote configuration to restore"),
            (status, _) => {
                warn!(status, body = %res.body, "Failed to fetch configuration");
                summary.fetch_failures += 1;
            }
        }

        info!("Config backup lists {} entries", in_backup);
        Ok(())
    }

    async fn restore_config(&self, row: &Value) -> bool {
        let row: ConfigRow = match serde_json::from_value(row.clone()) {
            Ok(row) => row,
            Err(e) => {
                warn!("Skipping malformed config row: {}", e);
                return false;
            }
        };
        if row.config_type != ENGINE_CONFIG_KEY {
            return false;
        }

        let path = &self.config.engine_config_path;
        if let Some(parent) = path.parent()
            && let Err(e) = fs::create_dir_all(parent).await
        {
            warn!(config_type = %row.config_type, "Failed to create {}: {}", parent.display(), e);
            return false;
        }
        match fs::write(path, raw_content(&row.data)).await {
            Ok(()) => {
                NativePlatform::restrict_file_permissions(path);
                info!(
                    config_type = %row.config_type,
                    updated_at = row.updated_at.as_deref().unwrap_or("unknown"),
                    "Configuration restored"
                );
                true
            }
            Err(e) => {
                warn!(config_type = %row.config_type, "Failed to restore configuration: {}", e);
                false
            }
        }
    }
}
