use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// What a parsed document on disk turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Workflow,
    Configuration,
    Unrecognized,
}

/// A local document picked up by the scanner. Rebuilt on every scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub name: String,
    pub data: Value,
    pub source_path: PathBuf,
    pub captured_at: DateTime<Utc>,
}

/// Row of the remote workflow table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRow {
    pub name: String,
    pub data: Value,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Row of the remote configuration table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRow {
    pub config_type: String,
    pub data: Value,
    #[serde(default)]
    pub updated_at: Option<String>,
}
