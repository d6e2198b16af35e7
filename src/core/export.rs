use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, warn};

use crate::core::config::{ENGINE_CONFIG_KEY, SyncConfig};
use crate::core::remote::{Method, RestClient};
use crate::core::scanner;
use crate::core::snapshot::{SnapshotCategory, SnapshotStore};

/// Remote result of a single create-or-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Created,
    Updated,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteTally {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

impl RemoteTally {
    fn record(&mut self, outcome: PushOutcome) {
        match outcome {
            PushOutcome::Created => self.created += 1,
            PushOutcome::Updated => self.updated += 1,
            PushOutcome::Failed => self.failed += 1,
        }
    }
}

/// Counts are documents processed, not remote successes; see `remote`.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub workflows_exported: usize,
    pub configs_exported: usize,
    pub local_backup_dir: PathBuf,
    pub remote_enabled: bool,
    pub remote: RemoteTally,
}

pub struct ExportEngine {
    config: SyncConfig,
    remote: Option<RestClient>,
    snapshots: SnapshotStore,
}

impl ExportEngine {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            remote: RestClient::from_config(config),
            snapshots: SnapshotStore::new(&config.backup_dir),
            config: config.clone(),
        }
    }

    /// Scan, push, snapshot. Never fails: each step logs its own errors so a
    /// shutdown flush always runs to the end.
    pub async fn run(&self) -> ExportSummary {
        info!("Starting export of {}", self.config.document_dir.display());

        if let Err(e) = self.snapshots.ensure_dir().await {
            error!("Backup directory unavailable: {:#}", e);
        }

        let configs = self.collect_configs().await;
        let report = scanner::scan(&self.config.document_dir).await;
        if !report.skipped.is_empty() {
            warn!("Skipped {} unreadable document(s)", report.skipped.len());
        }
        let workflows = report.records;

        let mut tally = RemoteTally::default();
        if let Some(client) = &self.remote {
            let table = &client.settings().workflow_table;
            for record in &workflows {
                let outcome = self
                    .push(client, table, "name", &record.name, record.data.clone())
                    .await;
                tally.record(outcome);
            }

            let table = &client.settings().config_table;
            for (config_type, content) in &configs {
                let outcome = self
                    .push(
                        client,
                        table,
                        "config_type",
                        config_type,
                        Value::String(content.clone()),
                    )
                    .await;
                tally.record(outcome);
            }
        } else {
            info!("Remote sync disabled; writing local backups only");
        }

        let now = Utc::now();
        if !workflows.is_empty() {
            let body = json!({
                "exported_at": now.to_rfc3339_opts(SecondsFormat::Millis, true),
                "workflows": workflows,
            });
            match self.snapshots.write(SnapshotCategory::Workflows, &body, now).await {
                Ok(paths) => info!(
                    archive = %paths.archive.display(),
                    stable = %paths.stable.display(),
                    "Workflow backup written"
                ),
                Err(e) => error!("Failed to write workflow backup: {:#}", e),
            }
        }
        if !configs.is_empty() {
            let body = json!(configs);
            match self.snapshots.write(SnapshotCategory::Config, &body, now).await {
                Ok(paths) => info!(
                    archive = %paths.archive.display(),
                    stable = %paths.stable.display(),
                    "Config backup written"
                ),
                Err(e) => error!("Failed to write config backup: {:#}", e),
            }
        }

        let summary = ExportSummary {
            workflows_exported: workflows.len(),
            configs_exported: configs.len(),
            local_backup_dir: self.snapshots.dir().to_path_buf(),
            remote_enabled: self.remote.is_some(),
            remote: tally,
        };
        info!(
            workflows = summary.workflows_exported,
            configs = summary.configs_exported,
            created = tally.created,
            updated = tally.updated,
            failed = tally.failed,
            "Export finished"
        );
        summary
    }

    /// Configuration lives at fixed paths; collected verbatim.
    async fn collect_configs(&self) -> BTreeMap<String, String> {
        let mut configs = BTreeMap::new();
        let path = &self.config.engine_config_path;
        match fs::read_to_string(path).await {
            Ok(content) => {
                configs.insert(ENGINE_CONFIG_KEY.to_string(), content);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No engine config at {}", path.display());
            }
            Err(e) => warn!("Failed to read engine config {}: {}", path.display(), e),
        }
        configs
    }

    /// Optimistic create; a 409 means the key exists, so update it in place.
    async fn push(
        &self,
        client: &RestClient,
        table: &str,
        key_column: &str,
        key: &str,
        data: Value,
    ) -> PushOutcome {
        let updated_at = Utc::now().to_rfc3339();
        let mut row = serde_json::Map::new();
        row.insert(key_column.to_string(), Value::String(key.to_string()));
        row.insert("data".to_string(), data.clone());
        row.insert("updated_at".to_string(), Value::String(updated_at.clone()));

        let created = client
            .send(Method::POST, &client.table_url(table), Some(&Value::Object(row)))
            .await;
        let res = match created {
            Ok(res) => res,
            Err(e) => {
                warn!(table, key, "Create failed: {:#}", e);
                return PushOutcome::Failed;
            }
        };

        if res.is_success() {
            info!(table, key, "Created remote row");
            return PushOutcome::Created;
        }
        if !res.is_conflict() {
            warn!(table, key, status = res.status, body = %res.body, "Create rejected");
            return PushOutcome::Failed;
        }

        let url = match client.filtered_url(table, key_column, key) {
            Ok(url) => url,
            Err(e) => {
                warn!(table, key, "Cannot build update url: {:#}", e);
                return PushOutcome::Failed;
            }
        };
        let patch = json!({ "data": data, "updated_at": updated_at });
        match client.send(Method::PATCH, &url, Some(&patch)).await {
            Ok(res) if res.is_success() => {
                info!(table, key, "Updated existing remote row");
                PushOutcome::Updated
            }
            Ok(res) => {
                warn!(table, key, status = res.status, body = %res.body, "Update rejected");
                PushOutcome::Failed
            }
            Err(e) => {
                warn!(table, key, "Update failed: {:#}", e);
                PushOutcome::Failed
            }
        }
    }
}
