use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

pub const CONFIG_FILE_NAME: &str = "flowsync.toml";

/// Remote `config_type` of the engine configuration file.
pub const ENGINE_CONFIG_KEY: &str = "n8n_config";
/// Filename of the engine configuration file inside the document root.
pub const ENGINE_CONFIG_FILE: &str = "config";

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const SERVICE_KEY_ENV: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const REST_URL_ENV: &str = "FLOWSYNC_REST_URL";
pub const HOME_ENV: &str = "FLOWSYNC_HOME";

/// Source of environment values. The CLI reads the process environment;
/// tests hand in a map.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.trim().is_empty()).cloned()
    }
}

/// Optional `flowsync.toml` in the base directory.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_document_dir")]
    pub document_dir: String,

    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    /// Explicit REST endpoint; wins over the one derived from `DATABASE_URL`.
    #[serde(default)]
    pub rest_url: Option<String>,

    #[serde(default = "default_workflow_table")]
    pub workflow_table: String,

    #[serde(default = "default_config_table")]
    pub config_table: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_document_dir() -> String {
    "n8n-config".to_string()
}
fn default_backup_dir() -> String {
    "backups".to_string()
}
fn default_workflow_table() -> String {
    "workflows_backup".to_string()
}
fn default_config_table() -> String {
    "config_backup".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            document_dir: default_document_dir(),
            backup_dir: default_backup_dir(),
            rest_url: None,
            workflow_table: default_workflow_table(),
            config_table: default_config_table(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl FileConfig {
    /// Reads `flowsync.toml` from `base_dir`. A missing file yields the defaults;
    /// an unreadable or malformed one is an error the caller may downgrade.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn backup_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.backup_dir)
    }
}

/// Everything needed to talk to the remote store. Absent when remote sync
/// is disabled for the run.
#[derive(Clone)]
pub struct RemoteSettings {
    pub base_url: String,
    pub api_key: String,
    pub workflow_table: String,
    pub config_table: String,
    pub timeout: Duration,
}

impl fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("workflow_table", &self.workflow_table)
            .field("config_table", &self.config_table)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Resolved once at startup and handed to each engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub document_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub engine_config_path: PathBuf,
    pub remote: Option<RemoteSettings>,
}

impl SyncConfig {
    pub fn resolve(base_dir: &Path, file: FileConfig, env: &dyn EnvSource) -> Self {
        let document_dir = base_dir.join(&file.document_dir);
        let backup_dir = file.backup_path(base_dir);
        let remote = resolve_remote(&file, env);

        match &remote {
            Some(settings) => info!(
                base_url = %settings.base_url,
                workflow_table = %settings.workflow_table,
                config_table = %settings.config_table,
                "Remote sync enabled"
            ),
            None => info!(
                "Remote sync disabled; {} and {} are required",
                DATABASE_URL_ENV, SERVICE_KEY_ENV
            ),
        }

        Self {
            engine_config_path: document_dir.join(ENGINE_CONFIG_FILE),
            document_dir,
            backup_dir,
            remote,
        }
    }

    /// Local-only configuration rooted at `base_dir` with default layout.
    #[cfg(test)]
    pub fn local_only(base_dir: &Path) -> Self {
        let file = FileConfig::default();
        let document_dir = base_dir.join(&file.document_dir);
        Self {
            engine_config_path: document_dir.join(ENGINE_CONFIG_FILE),
            document_dir,
            backup_dir: file.backup_path(base_dir),
            remote: None,
        }
    }
}

fn resolve_remote(file: &FileConfig, env: &dyn EnvSource) -> Option<RemoteSettings> {
    let explicit = env.var(REST_URL_ENV).or_else(|| file.rest_url.clone());
    let base_url = match explicit {
        Some(url) => url,
        None => {
            let connection_string = env.var(DATABASE_URL_ENV)?;
            match derive_rest_url(&connection_string) {
                Some(url) => url,
                None => {
                    warn!(
                        "{} does not name a Supabase database; remote sync disabled",
                        DATABASE_URL_ENV
                    );
                    return None;
                }
            }
        }
    };

    let Some(api_key) = env.var(SERVICE_KEY_ENV) else {
        warn!("{} is not set; remote sync disabled", SERVICE_KEY_ENV);
        return None;
    };

    Some(RemoteSettings {
        base_url: base_url.trim_end_matches('/').to_string(),
        api_key,
        workflow_table: file.workflow_table.clone(),
        config_table: file.config_table.clone(),
        timeout: Duration::from_secs(file.request_timeout_secs.max(1)),
    })
}

/// Maps `postgresql://user:pw@db.<project>.supabase.co:5432/postgres` to
/// `https://<project>.supabase.co`. Anything else yields `None`.
pub fn derive_rest_url(connection_string: &str) -> Option<String> {
    if !connection_string.contains("supabase") {
        return None;
    }
    let url = Url::parse(connection_string).ok()?;
    let host = url.host_str()?;
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 3 && !labels[1].is_empty() && labels[2] == "supabase" {
        Some(format!("https://{}.supabase.co", labels[1]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn derives_project_url_from_supabase_host() {
        let url = derive_rest_url("postgresql://postgres:pw@db.abcdef.supabase.co:5432/postgres");
        assert_eq!(url.as_deref(), Some("https://abcdef.supabase.co"));
    }

    #[test]
    fn rejects_non_supabase_and_malformed_strings() {
        assert!(derive_rest_url("postgresql://postgres:pw@localhost:5432/db").is_none());
        assert!(derive_rest_url("not a url but mentions supabase").is_none());
        assert!(derive_rest_url("postgresql://u:p@supabase.co/db").is_none());
        assert!(derive_rest_url("postgresql://u:p@db..supabase.co/db").is_none());
    }

    #[test]
    fn remote_enabled_with_database_url_and_key() {
        let vars = env(&[
            (DATABASE_URL_ENV, "postgres://u:p@db.proj1.supabase.co:5432/postgres"),
            (SERVICE_KEY_ENV, "secret"),
        ]);
        let cfg = SyncConfig::resolve(Path::new("/srv/n8n"), FileConfig::default(), &vars);
        let remote = cfg.remote.expect("remote settings");
        assert_eq!(remote.base_url, "https://proj1.supabase.co");
        assert_eq!(remote.api_key, "secret");
        assert_eq!(remote.workflow_table, "workflows_backup");
        assert_eq!(remote.config_table, "config_backup");
        assert_eq!(cfg.document_dir, Path::new("/srv/n8n/n8n-config"));
        assert_eq!(cfg.backup_dir, Path::new("/srv/n8n/backups"));
        assert_eq!(cfg.engine_config_path, Path::new("/srv/n8n/n8n-config/config"));
    }

    #[test]
    fn missing_key_disables_remote() {
        let vars = env(&[(DATABASE_URL_ENV, "postgres://u:p@db.proj1.supabase.co/postgres")]);
        let cfg = SyncConfig::resolve(Path::new("/tmp"), FileConfig::default(), &vars);
        assert!(cfg.remote.is_none());
    }

    #[test]
    fn missing_database_url_disables_remote() {
        let vars = env(&[(SERVICE_KEY_ENV, "secret")]);
        let cfg = SyncConfig::resolve(Path::new("/tmp"), FileConfig::default(), &vars);
        assert!(cfg.remote.is_none());
    }

    #[test]
    fn blank_values_count_as_absent() {
        let vars = env(&[
            (DATABASE_URL_ENV, "postgres://u:p@db.proj1.supabase.co/postgres"),
            (SERVICE_KEY_ENV, "   "),
        ]);
        let cfg = SyncConfig::resolve(Path::new("/tmp"), FileConfig::default(), &vars);
        assert!(cfg.remote.is_none());
    }

    #[test]
    fn explicit_rest_url_overrides_derivation() {
        let vars = env(&[
            (REST_URL_ENV, "http://127.0.0.1:3000/"),
            (SERVICE_KEY_ENV, "secret"),
        ]);
        let cfg = SyncConfig::resolve(Path::new("/tmp"), FileConfig::default(), &vars);
        assert_eq!(cfg.remote.unwrap().base_url, "http://127.0.0.1:3000");
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let vars = env(&[
            (REST_URL_ENV, "http://127.0.0.1:3000"),
            (SERVICE_KEY_ENV, "very-secret-key"),
        ]);
        let cfg = SyncConfig::resolve(Path::new("/tmp"), FileConfig::default(), &vars);
        let printed = format!("{:?}", cfg);
        assert!(!printed.contains("very-secret-key"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn load_missing_file_returns_default() {
        let tmp = tempfile::tempdir().unwrap();
        let file = FileConfig::load(tmp.path()).unwrap();
        assert_eq!(file.document_dir, "n8n-config");
        assert_eq!(file.request_timeout_secs, 30);
    }

    #[test]
    fn load_reads_overrides_and_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let content = r#"
document_dir = "data/n8n"
workflow_table = "wf"
request_timeout_secs = 5
"#;
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), content).unwrap();
        let file = FileConfig::load(tmp.path()).unwrap();
        assert_eq!(file.document_dir, "data/n8n");
        assert_eq!(file.backup_dir, "backups");
        assert_eq!(file.workflow_table, "wf");
        assert_eq!(file.config_table, "config_backup");
        assert_eq!(file.request_timeout_secs, 5);
    }

    #[test]
    fn load_malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "document_dir = [").unwrap();
        assert!(FileConfig::load(tmp.path()).is_err());
    }
}
